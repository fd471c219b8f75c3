// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for display and user agents)
pub const APP_NAME: &str = "agtrace";

/// Application name in lowercase (for log targets and identifiers)
pub const APP_NAME_LOWER: &str = "agtrace";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "agtrace.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "AGTRACE_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "AGTRACE_LOG";

// =============================================================================
// Environment Variables - Pricing
// =============================================================================

/// Environment variable for the LiteLLM-format price list URL
pub const ENV_PRICING_URL: &str = "AGTRACE_PRICING_URL";

/// Environment variable for a local LiteLLM-format price file (wins over the URL)
pub const ENV_PRICING_FILE: &str = "AGTRACE_PRICING_FILE";

/// Environment variable for the price table refresh interval in minutes
pub const ENV_PRICING_REFRESH_MINUTES: &str = "AGTRACE_PRICING_REFRESH_MINUTES";

// =============================================================================
// Environment Variables - Normalization
// =============================================================================

/// Environment variable selecting the semantic convention table version
pub const ENV_SEMCONV_VERSION: &str = "AGTRACE_SEMCONV_VERSION";

/// Environment variable for the default analytics timezone (IANA name)
pub const ENV_ANALYTICS_TIMEZONE: &str = "AGTRACE_TIMEZONE";

// =============================================================================
// Pricing Defaults
// =============================================================================

/// Price table refresh interval in minutes
pub const DEFAULT_PRICING_REFRESH_MINUTES: u64 = 60;

/// LiteLLM model pricing JSON
pub const PRICING_SYNC_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

// =============================================================================
// Analytics Defaults
// =============================================================================

/// Timezone used for bucket alignment when none is configured
pub const DEFAULT_ANALYTICS_TIMEZONE: &str = "UTC";

// =============================================================================
// Storage Defaults
// =============================================================================

/// Most spans the in-memory store holds before refusing new ones
pub const DEFAULT_MAX_STORED_SPANS: usize = 1_000_000;
