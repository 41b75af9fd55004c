use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use memwall_api_types::Role;

/// Command-line arguments for the Memwall binary.
#[derive(Debug, Parser)]
#[command(name = "memwall", version, about = "Memory Wall command-line client")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MEMWALL_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub credentials: Credentials,

    #[command(flatten)]
    pub overrides: ClientOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Sign in before running the command when both are present.
#[derive(Debug, Args, Default, Clone)]
pub struct Credentials {
    #[arg(long, env = "MEMWALL_EMAIL", value_name = "EMAIL", global = true)]
    pub email: Option<String>,

    #[arg(
        long,
        env = "MEMWALL_PASSWORD",
        value_name = "PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub password: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClientOverrides {
    /// Override the API base URL.
    #[arg(long = "api-url", value_name = "URL", value_hint = ValueHint::Url, global = true)]
    pub api_url: Option<String>,

    /// Override the request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the maximum number of cached entries.
    #[arg(long = "cache-max-entries", value_name = "COUNT", global = true)]
    pub cache_max_entries: Option<usize>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show the server's view of the current session.
    Status,
    /// Dashboard counters for the signed-in user.
    Stats,
    /// List your walls, or walls shared with you.
    Walls {
        #[arg(long, action = clap::ArgAction::SetTrue)]
        shared: bool,
    },
    /// Show one wall.
    Wall { wall_id: String },
    /// List the members of a wall.
    Members { wall_id: String },
    /// List one page of a wall's memories.
    Memories {
        wall_id: String,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },
    /// Show one memory.
    Memory { wall_id: String, memory_id: String },
    #[command(name = "create-wall")]
    CreateWall(WallFields),
    #[command(name = "update-wall")]
    UpdateWall {
        wall_id: String,
        #[command(flatten)]
        fields: WallUpdateFields,
    },
    #[command(name = "delete-wall")]
    DeleteWall { wall_id: String },
    /// Invite a user to a wall by email.
    Invite {
        wall_id: String,
        #[arg(long = "invitee", value_name = "EMAIL")]
        invitee_email: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Viewer)]
        role: RoleArg,
    },
    #[command(name = "set-role")]
    SetRole {
        wall_id: String,
        user_id: String,
        #[arg(long, value_enum)]
        role: RoleArg,
    },
    #[command(name = "remove-member")]
    RemoveMember { wall_id: String, user_id: String },
    #[command(name = "create-memory")]
    CreateMemory {
        wall_id: String,
        #[command(flatten)]
        fields: MemoryFields,
    },
    #[command(name = "update-memory")]
    UpdateMemory {
        wall_id: String,
        memory_id: String,
        #[command(flatten)]
        fields: MemoryUpdateFields,
    },
    #[command(name = "delete-memory")]
    DeleteMemory { wall_id: String, memory_id: String },
    /// Create an account and sign in.
    Register(RegisterArgs),
    #[command(name = "change-password")]
    ChangePassword {
        #[arg(long = "current", env = "MEMWALL_CURRENT_PASSWORD", hide_env_values = true)]
        current_password: String,
        #[arg(long = "new", env = "MEMWALL_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
    /// End the session on the server and locally.
    Logout,
}

#[derive(Debug, Args, Clone)]
pub struct WallFields {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long = "cover-image", value_name = "URL")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WallUpdateFields {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long = "cover-image", value_name = "URL")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MemoryFields {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub content: Option<String>,
    /// Date the memory refers to (RFC 3339).
    #[arg(long = "date", value_name = "DATE")]
    pub memory_date: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MemoryUpdateFields {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    #[arg(long = "date", value_name = "DATE")]
    pub memory_date: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RegisterArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long = "account-email", value_name = "EMAIL")]
    pub account_email: String,
    #[arg(long = "account-password", env = "MEMWALL_NEW_PASSWORD", hide_env_values = true)]
    pub account_password: String,
    #[arg(long = "confirm-password")]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    Viewer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::Viewer => Role::Viewer,
        }
    }
}
