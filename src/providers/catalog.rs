//! Static provider and model catalog
//!
//! The case-sensitive mapping of known provider names to their upstream
//! settings, plus the model list served by `GET /api/v1/models`. Every entry
//! is an openai-compatible upstream handled by
//! [`super::compat::OpenAICompatProvider`].

use serde::Serialize;

/// Construction settings for one known vendor.
#[derive(Debug, Clone, Copy)]
pub struct VendorSpec {
    pub name: &'static str,
    /// Empty when the caller must supply a deployment endpoint.
    pub base_url: &'static str,
    /// Environment variable that may hold a construction-time API key.
    pub key_env: Option<&'static str>,
    /// Custom auth header replacing `Authorization: Bearer` (Azure).
    pub api_key_header: Option<&'static str>,
    /// Whether the request must carry an explicit endpoint.
    pub requires_endpoint: bool,
}

/// Known vendors. Lookup is case-sensitive.
pub const VENDORS: &[VendorSpec] = &[
    VendorSpec {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        key_env: Some("OPENAI_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "azure",
        base_url: "",
        key_env: Some("AZURE_OPENAI_API_KEY"),
        api_key_header: Some("api-key"),
        requires_endpoint: true,
    },
    VendorSpec {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        key_env: Some("GROQ_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "mistral",
        base_url: "https://api.mistral.ai/v1",
        key_env: Some("MISTRAL_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        key_env: Some("DEEPSEEK_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "together",
        base_url: "https://api.together.xyz/v1",
        key_env: Some("TOGETHER_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference/v1",
        key_env: Some("FIREWORKS_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "xai",
        base_url: "https://api.x.ai/v1",
        key_env: Some("XAI_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "moonshot",
        base_url: "https://api.moonshot.ai/v1",
        key_env: Some("MOONSHOT_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "cerebras",
        base_url: "https://api.cerebras.ai/v1",
        key_env: Some("CEREBRAS_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "perplexity",
        base_url: "https://api.perplexity.ai",
        key_env: Some("PERPLEXITY_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "sambanova",
        base_url: "https://api.sambanova.ai/v1",
        key_env: Some("SAMBANOVA_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "novita",
        base_url: "https://api.novita.ai/v3/openai",
        key_env: Some("NOVITA_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        key_env: None,
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "ai21",
        base_url: "https://api.ai21.com/v1",
        key_env: Some("AI21_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    // Baseten serves each model from its own deployment URL, so the caller
    // must supply the endpoint.
    VendorSpec {
        name: "baseten",
        base_url: "",
        key_env: Some("BASETEN_API_KEY"),
        api_key_header: None,
        requires_endpoint: true,
    },
    VendorSpec {
        name: "anyscale",
        base_url: "https://api.endpoints.anyscale.com/v1",
        key_env: Some("ANYSCALE_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    // Cloudflare's URL is scoped to an account id, so the caller must supply
    // the endpoint.
    VendorSpec {
        name: "cloudflare",
        base_url: "",
        key_env: Some("CLOUDFLARE_API_KEY"),
        api_key_header: None,
        requires_endpoint: true,
    },
    VendorSpec {
        name: "zai",
        base_url: "https://api.z.ai/api/paas/v4",
        key_env: Some("ZAI_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "hyperbolic",
        base_url: "https://api.hyperbolic.xyz/v1",
        key_env: Some("HYPERBOLIC_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "minimax",
        base_url: "https://api.minimax.chat/v1",
        key_env: Some("MINIMAX_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "deepinfra",
        base_url: "https://api.deepinfra.com/v1/openai",
        key_env: Some("DEEPINFRA_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "nebius",
        base_url: "https://api.studio.nebius.ai/v1",
        key_env: Some("NEBIUS_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "nvidia",
        base_url: "https://integrate.api.nvidia.com/v1",
        key_env: Some("NVIDIA_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "upstage",
        base_url: "https://api.upstage.ai/v1/solar",
        key_env: Some("UPSTAGE_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "friendli",
        base_url: "https://api.friendli.ai/serverless/v1",
        key_env: Some("FRIENDLI_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "replicate",
        base_url: "https://api.replicate.com/v1",
        key_env: Some("REPLICATE_API_TOKEN"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "cohere",
        base_url: "https://api.cohere.ai/compatibility/v1",
        key_env: Some("COHERE_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "siliconflow",
        base_url: "https://api.siliconflow.cn/v1",
        key_env: Some("SILICONFLOW_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "stepfun",
        base_url: "https://api.stepfun.com/v1",
        key_env: Some("STEPFUN_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "scaleway",
        base_url: "https://api.scaleway.ai/v1",
        key_env: Some("SCALEWAY_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
    VendorSpec {
        name: "liquid",
        base_url: "https://api.liquid.ai/v1",
        key_env: Some("LIQUID_API_KEY"),
        api_key_header: None,
        requires_endpoint: false,
    },
];

/// Look up a vendor by its exact name.
pub fn find_vendor(name: &str) -> Option<&'static VendorSpec> {
    VENDORS.iter().find(|vendor| vendor.name == name)
}

/// Catalog entry returned by the models endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub object: &'static str,
    pub owned_by: &'static str,
    pub provider: &'static str,
    pub name: &'static str,
    pub context_len: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub category: &'static [&'static str],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_flagship: bool,
}

const fn model(
    id: &'static str,
    owned_by: &'static str,
    provider: &'static str,
    name: &'static str,
    context_len: u32,
    is_flagship: bool,
) -> ModelInfo {
    ModelInfo {
        id,
        object: "model",
        owned_by,
        provider,
        name,
        context_len,
        description: None,
        category: &[],
        is_flagship,
    }
}

/// Static model list; ids are qualified `provider/model` strings.
pub const MODEL_CATALOG: &[ModelInfo] = &[
    model("openai/gpt-4o", "openai", "openai", "GPT-4o", 128_000, true),
    model("openai/gpt-4o-mini", "openai", "openai", "GPT-4o mini", 128_000, false),
    model("openai/gpt-4.1", "openai", "openai", "GPT-4.1", 1_047_576, true),
    model("openai/gpt-4.1-mini", "openai", "openai", "GPT-4.1 mini", 1_047_576, false),
    model("groq/llama-3.3-70b-versatile", "meta", "groq", "Llama 3.3 70B", 131_072, true),
    model("groq/llama-3.1-8b-instant", "meta", "groq", "Llama 3.1 8B", 131_072, false),
    model("mistral/mistral-large-latest", "mistralai", "mistral", "Mistral Large", 131_072, true),
    model("mistral/mistral-small-latest", "mistralai", "mistral", "Mistral Small", 32_768, false),
    model("deepseek/deepseek-chat", "deepseek", "deepseek", "DeepSeek V3", 65_536, true),
    model("deepseek/deepseek-reasoner", "deepseek", "deepseek", "DeepSeek R1", 65_536, false),
    model("together/meta-llama/Llama-3.3-70B-Instruct-Turbo", "meta", "together", "Llama 3.3 70B Turbo", 131_072, false),
    model("fireworks/accounts/fireworks/models/llama-v3p1-405b-instruct", "meta", "fireworks", "Llama 3.1 405B", 131_072, false),
    model("xai/grok-3", "xai", "xai", "Grok 3", 131_072, true),
    model("moonshot/kimi-k2-0711-preview", "moonshot", "moonshot", "Kimi K2", 131_072, true),
    model("cerebras/llama-3.3-70b", "meta", "cerebras", "Llama 3.3 70B", 65_536, false),
    model("perplexity/sonar-pro", "perplexity", "perplexity", "Sonar Pro", 200_000, true),
];
