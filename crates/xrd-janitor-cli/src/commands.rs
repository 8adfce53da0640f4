use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use xrd_janitor_core::DuplicatePolicy;

#[derive(Debug, Parser)]
#[command(name = "xrd-janitor", version)]
#[command(about = "Keeps XRootD style name spaces and data stores consistent", long_about = None)]
pub struct Cli {
    /// Worker threads (default: twice the available processing units)
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum PolicyArg {
    /// Remove every link of a duplicate group and the shared data file
    #[default]
    DeleteGroup,
    /// Keep the first discovered link and its data file
    KeepFirst,
}

impl From<PolicyArg> for DuplicatePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::DeleteGroup => DuplicatePolicy::DeleteGroup,
            PolicyArg::KeepFirst => DuplicatePolicy::KeepFirst,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Remove dangling links, duplicate links and illegal entries from a name space
    NsClean {
        /// Name space root
        namespace: PathBuf,

        #[arg(long, value_enum, default_value_t)]
        duplicate_policy: PolicyArg,

        /// Write candidates to this CSV file instead of asking
        #[arg(long)]
        save_to: Option<PathBuf>,
    },
    /// Find and remove data files no name space link points to
    DarkData {
        /// Name space root
        namespace: PathBuf,

        /// Data store roots
        #[arg(required = true)]
        data: Vec<PathBuf>,

        /// Further name spaces whose links also claim data
        #[arg(long = "namespace")]
        extra_namespaces: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t)]
        duplicate_policy: PolicyArg,

        /// Write candidates to this CSV file instead of asking
        #[arg(long)]
        save_to: Option<PathBuf>,
    },
    /// Move link + data pairs to another name space and data store
    Drain {
        source_namespace: PathBuf,
        source_data: PathBuf,
        /// [user@]destination.server[:port], or localhost
        destination: String,
        destination_namespace: PathBuf,
        destination_data: PathBuf,
        /// user:group for created files, links and directories
        owner: String,

        /// Only move files whose path matches this glob
        #[arg(long)]
        source_pattern: Option<String>,
    },
    /// Remove entries present on more than one storage server; the first server wins
    SeDedup {
        /// [user@]server[:port]/name/space/path
        #[arg(required = true, num_args = 2..)]
        servers: Vec<String>,

        /// Write candidates to this CSV file instead of asking
        #[arg(long)]
        save_to: Option<PathBuf>,
    },
    /// Write the entry lists of several storage servers to files
    Collect {
        /// [user@]server[:port]/name/space/path
        #[arg(required = true)]
        servers: Vec<String>,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print every link below a name space, NUL separated
    #[command(hide = true)]
    EmitEntries { namespace: PathBuf },
    /// Print configuration values
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drain() {
        let cli = Cli::try_parse_from([
            "xrd-janitor",
            "drain",
            "/ns",
            "/data",
            "xrootd@se2:2222",
            "/new/ns",
            "/new/data",
            "xrootd:xrootd",
            "-t",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.threads, Some(8));
        assert!(matches!(cli.command, Some(Commands::Drain { ref owner, .. }) if owner == "xrootd:xrootd"));
    }

    #[test]
    fn test_se_dedup_needs_two_servers() {
        assert!(Cli::try_parse_from(["xrd-janitor", "se-dedup", "se1/ns"]).is_err());
        assert!(Cli::try_parse_from(["xrd-janitor", "se-dedup", "se1/ns", "se2/ns"]).is_ok());
    }

    #[test]
    fn test_dark_data_options() {
        let cli = Cli::try_parse_from([
            "xrd-janitor",
            "dark-data",
            "/ns",
            "/data/1",
            "/data/2",
            "--namespace",
            "/ns2",
            "--duplicate-policy",
            "keep-first",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::DarkData {
                data,
                extra_namespaces,
                duplicate_policy,
                ..
            }) => {
                assert_eq!(data.len(), 2);
                assert_eq!(extra_namespaces, vec![PathBuf::from("/ns2")]);
                assert_eq!(
                    DuplicatePolicy::from(duplicate_policy),
                    DuplicatePolicy::KeepFirst
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
