/// Name used for XDG directories and the config file location.
pub const APP_NAME: &str = "llbuild";

/// Project descriptor file name, looked up in the project root.
pub const PROJECT_FILE: &str = "linglong.yaml";

/// Package metadata file written beside every committed module.
pub const INFO_FILE: &str = "info.json";

/// Configuration file inside the config directory.
pub const CONFIG_FILE: &str = "builder.yaml";

/// Default channel used when composing store refs.
pub const DEFAULT_CHANNEL: &str = "linglong";

/// Module name of the main package output.
pub const MODULE_RUNTIME: &str = "runtime";

/// Module name of the development split.
pub const MODULE_DEVEL: &str = "devel";

/// Where the project source is mounted inside the sandbox.
pub const SOURCE_MOUNT: &str = "/source";

/// Where the generated build script is mounted inside the sandbox.
pub const SCRIPT_MOUNT: &str = "/entry.sh";

/// Where runtime and dependency files are mounted inside the sandbox.
pub const RUNTIME_MOUNT: &str = "/runtime";

/// Install prefix of lib and runtime packages.
pub const RUNTIME_PREFIX: &str = "/runtime";

/// Upper bound of the sandbox-init result document in bytes.
pub const RESULT_BUFFER_SIZE: usize = 1024;

/// Desktop entry key tagging entries with their owning package.
pub const DESKTOP_TAG_KEY: &str = "X-linglong";

/// Subtrees of the install output that belong to the devel module.
pub const DEVEL_SUBDIRS: [&str; 5] = ["debug", "include", "mkspecs", "cmake", "pkgconfig"];

/// PATH exported to the build script.
pub const SANDBOX_PATH: &str = "/runtime/bin:/usr/local/bin:/usr/bin:/bin:/usr/local/games:/usr/games:/sbin:/usr/sbin";

/// User agent sent with source downloads.
pub const FETCH_USER_AGENT: &str = "Wget/1.21.4";
