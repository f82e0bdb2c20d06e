use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for multiworld")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and docs
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Drive the CLI through create, clone, list and remove in a scratch universe
    Smoke,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            fmt()?;
            clippy()?;
            test()?;
            doc()?;
        }
        Commands::Fmt => fmt()?,
        Commands::Clippy => clippy()?,
        Commands::Test => test()?,
        Commands::Doc => doc()?,
        Commands::Smoke => smoke()?,
    }

    Ok(())
}

fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {label}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {label} failed");
    }
    Ok(())
}

fn fmt() -> Result<()> {
    cargo("fmt --check", &["fmt", "--all", "--", "--check"])
}

fn clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

fn test() -> Result<()> {
    cargo("test", &["test", "--workspace"])
}

fn doc() -> Result<()> {
    cargo("doc", &["doc", "--workspace", "--no-deps"])
}

fn smoke() -> Result<()> {
    let root = std::env::temp_dir().join(format!("multiworld-smoke-{}", std::process::id()));
    let result = smoke_in(&root);
    if root.exists() {
        std::fs::remove_dir_all(&root)?;
    }
    result
}

fn smoke_in(root: &Path) -> Result<()> {
    let root = root.to_string_lossy();
    let steps: [&[&str]; 6] = [
        &["add", "arena", "--type", "flat"],
        &["clone", "arena", "arena-copy"],
        &["tp", "arena"],
        &["protect", "arena-copy"],
        &["remove", "arena-copy", "--destroy"],
        &["list"],
    ];
    for step in steps {
        let mut args = vec!["run", "-q", "-p", "multiworld-cli", "--", "--root", &*root];
        args.extend_from_slice(step);
        cargo(&step.join(" "), &args)?;
    }
    Ok(())
}
