//! mygit - a minimal git: loose objects, pack decoding, smart HTTP clone.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// mygit - content-addressed version control
#[derive(Parser, Debug)]
#[command(name = "mygit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a repository in the current directory
    Init,

    /// Pretty-print an object's contents
    #[command(name = "cat-file")]
    CatFile {
        /// Pretty-print the object (required)
        #[arg(short)]
        pretty: bool,
        /// Full or partial object hash
        hash: String,
    },

    /// List the entries of a tree object
    #[command(name = "ls-tree")]
    LsTree {
        /// Print only entry names
        #[arg(long)]
        name_only: bool,
        /// Full or partial tree hash
        hash: String,
    },

    /// Hash files as blobs
    #[command(name = "hash-object")]
    HashObject {
        /// Write the blobs into the object store
        #[arg(short)]
        write: bool,
        /// Glob pattern of files to hash
        pattern: String,
    },

    /// Build a tree object from the working directory
    #[command(name = "write-tree")]
    WriteTree,

    /// Fabricate a commit for an existing tree
    #[command(name = "commit-tree")]
    CommitTree {
        /// Hash of the tree to commit
        tree: String,
        /// Parent commit hash
        #[arg(short)]
        parent: Option<String>,
        /// Commit message
        #[arg(short)]
        message: String,
    },

    /// Clone a remote repository over smart HTTP
    Clone {
        /// Remote repository URL
        url: String,
        /// Destination directory
        dir: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mygit={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root = Path::new(".");
    let result = match cli.command {
        Commands::Init => commands::init(root).map(String::into_bytes),
        Commands::CatFile { pretty, hash } => commands::cat_file(root, pretty, &hash),
        Commands::LsTree { name_only, hash } => {
            commands::ls_tree(root, name_only, &hash).map(String::into_bytes)
        }
        Commands::HashObject { write, pattern } => {
            commands::hash_object(root, write, &pattern).map(String::into_bytes)
        }
        Commands::WriteTree => commands::write_tree(root).map(String::into_bytes),
        Commands::CommitTree {
            tree,
            parent,
            message,
        } => commands::commit_tree(root, &tree, parent.as_deref(), &message)
            .map(String::into_bytes),
        Commands::Clone { url, dir } => commands::clone(&url, &dir).map(String::into_bytes),
    };

    match result {
        Ok(output) => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&output).and_then(|_| stdout.flush()).ok();
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
