/// Constants used throughout PACC
/// This module centralizes all constant values for better maintainability

/// Hook event types recognized by Claude Code
/// An eventTypes entry outside this vocabulary is a validation error
pub const HOOK_EVENT_TYPES: &[&str] = &[
    "PreToolUse",
    "PostToolUse",
    "Notification",
    "UserPromptSubmit",
    "Stop",
    "SubagentStop",
    "PreCompact",
    "SessionStart",
    "SessionEnd",
];

/// Canonical install directory name per extension kind, relative to a scope root
pub const HOOKS_DIR: &str = "hooks";
pub const MCPS_DIR: &str = "mcps";
pub const AGENTS_DIR: &str = "agents";
pub const COMMANDS_DIR: &str = "commands";

/// Name of the scope root directory under a home or project directory
pub const SCOPE_ROOT_DIR: &str = ".claude";

/// Settings file name inside a scope root
pub const SETTINGS_FILE: &str = "settings.json";

/// Plugin settings file name inside a scope root (separate from extension settings)
pub const PLUGIN_SETTINGS_FILE: &str = "plugins.json";

/// Directory under a scope root where plugin repositories are cloned
pub const PLUGIN_REPOS_DIR: &str = "plugins/repos";

/// Project manifest file name at a project root
pub const PROJECT_MANIFEST: &str = "pacc.json";

/// Environment variable that turns the plugin system on
pub const ENABLE_PLUGINS_VAR: &str = "ENABLE_PLUGINS";

/// Marker lines bracketing the block `pacc plugin env setup` writes to a shell profile
pub const PROFILE_BLOCK_BEGIN: &str = "# >>> pacc initialize >>>";
pub const PROFILE_BLOCK_END: &str = "# <<< pacc initialize <<<";

/// Maximum file size accepted by the kind validators (bytes)
pub const MAX_EXTENSION_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum body size accepted by fragment validation (bytes)
pub const MAX_FRAGMENT_CONTENT_SIZE: usize = 1024 * 1024;

/// Maximum number of redirects followed when fetching a source URL
pub const FETCH_MAX_REDIRECTS: usize = 5;

/// Maximum download size when fetching a source URL (bytes)
pub const FETCH_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// How many ancestor directories the detector inspects when no project
/// root bounds the walk
pub const DETECTOR_MAX_ANCESTORS: usize = 6;

/// Minimum keyword score before the content tier of the detector commits
/// to a kind
pub const DETECTOR_SCORE_THRESHOLD: u32 = 6;

/// Weighted keywords for the content tier of the extension-type detector.
/// Directory placement always wins over these scores.
pub const HOOK_KEYWORDS: &[(&str, u32)] = &[
    ("eventtypes", 6),
    ("pretooluse", 5),
    ("posttooluse", 5),
    ("matchers", 3),
    ("hook", 3),
    ("commands", 2),
];

pub const MCP_KEYWORDS: &[(&str, u32)] = &[
    ("mcpservers", 6),
    ("mcp", 4),
    ("server", 2),
    ("transport", 3),
    ("stdio", 3),
    ("capabilities", 2),
    ("env", 1),
];

pub const AGENT_KEYWORDS: &[(&str, u32)] = &[
    ("agent", 4),
    ("model", 3),
    ("tool", 3),
    ("permission", 3),
    ("system_prompt", 5),
    ("persona", 2),
];

pub const COMMAND_KEYWORDS: &[(&str, u32)] = &[
    ("command", 4),
    ("aliases", 4),
    ("slash", 4),
    ("usage", 2),
    ("argument", 2),
];

/// Patterns the shared security scan flags as possible shell injection
pub const SHELL_INJECTION_PATTERNS: &[&str] = &[
    "$(",
    "`",
    "&&",
    "||",
    "; rm ",
    "| sh",
    "| bash",
    "eval ",
    "exec(",
];

/// Patterns that indicate embedded script content in otherwise-declarative files
pub const EMBEDDED_SCRIPT_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "subprocess.",
    "os.system",
    "child_process",
];

/// Filesystem locations whose mention in an extension is worth a warning
pub const SENSITIVE_PATHS: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "~/.ssh",
    ".ssh/id_rsa",
    ".aws/credentials",
    ".gnupg",
    "/dev/tcp",
];

/// Marker files that hint at the project's language, used to boost plugin
/// search relevance
pub const PROJECT_TYPE_MARKERS: &[(&str, &str)] = &[
    ("requirements.txt", "python"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("package.json", "javascript"),
    ("tsconfig.json", "typescript"),
    ("Cargo.toml", "rust"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("Gemfile", "ruby"),
];

/// Well-known Git hosts that take a personal token as the URL username
pub const TOKEN_AUTH_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Directory names skipped when walking a source tree for candidates
pub const SKIPPED_DIR_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
];
