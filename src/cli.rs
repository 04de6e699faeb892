use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "k1s0-roster-sync-server",
    version,
    about = "Synchronize SEGES class rosters into the internal classes and users services"
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "config/config.yaml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import classes from the roster
    Classes(ImportArgs),
    /// Import students (creating missing classes first)
    Students(ImportArgs),
    /// Import classes and students
    All(ImportArgs),
    /// Check whether the external roster system is reachable
    Status,
    /// Show a sync job and its items
    Job {
        /// Sync job id
        id: Uuid,
    },
    /// List recent sync jobs of a school
    Jobs {
        #[arg(long)]
        school_id: String,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show aggregated sync job counts of a school
    Metrics {
        #[arg(long)]
        school_id: String,
    },
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Target school id
    #[arg(long)]
    pub school_id: String,

    /// Id of the user starting the import
    #[arg(long)]
    pub user_id: String,

    /// Bearer token forwarded to the roster, classes and users services
    #[arg(long, env = "ROSTER_SYNC_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_students() {
        let cli = Cli::parse_from([
            "k1s0-roster-sync-server",
            "students",
            "--school-id",
            "s1",
            "--user-id",
            "u1",
            "--token",
            "tok",
        ]);
        assert_eq!(cli.config, "config/config.yaml");
        match cli.command {
            Commands::Students(args) => {
                assert_eq!(args.school_id, "s1");
                assert_eq!(args.user_id, "u1");
                assert_eq!(args.token, "tok");
            }
            _ => panic!("Expected students subcommand"),
        }
    }

    #[test]
    fn test_parse_job_id() {
        let id = Uuid::new_v4();
        let cli = Cli::parse_from(["k1s0-roster-sync-server", "job", &id.to_string()]);
        match cli.command {
            Commands::Job { id: parsed } => assert_eq!(parsed, id),
            _ => panic!("Expected job subcommand"),
        }
    }

    #[test]
    fn test_parse_jobs_default_limit() {
        let cli = Cli::parse_from(["k1s0-roster-sync-server", "--config", "x.yaml", "jobs", "--school-id", "s1"]);
        assert_eq!(cli.config, "x.yaml");
        assert!(matches!(cli.command, Commands::Jobs { limit: 20, .. }));
    }

    #[test]
    fn test_rejects_invalid_job_id() {
        assert!(Cli::try_parse_from(["k1s0-roster-sync-server", "job", "not-a-uuid"]).is_err());
    }
}
