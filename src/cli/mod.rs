// Operator CLI: inspect configuration and work with identifier tokens
// (support staff paste tokens out of logs or bug reports and need the row id
// back, or mint a token to craft a request by hand).
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use crate::config;
use crate::token::{self, EntityKind};

#[derive(Parser)]
#[command(name = "cpms")]
#[command(about = "CPMS CLI - operator tooling for the back-office API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Identifier token operations")]
    Token {
        #[command(subcommand)]
        cmd: TokenCommands,
    },

    #[command(about = "Show the effective configuration")]
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Encode an entity kind and numeric id into a token")]
    Encode {
        #[arg(help = "Entity kind, e.g. user, development-team, project")]
        kind: String,
        id: i64,
    },

    #[command(about = "Decode a token back to its numeric id")]
    Decode {
        #[arg(help = "Entity kind the token was minted for")]
        kind: String,
        token: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Print the resolved configuration as JSON (secrets redacted)")]
    Show,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Token { cmd } => handle_token(cmd),
        Commands::Config { cmd } => handle_config(cmd),
    }
}

fn parse_kind(s: &str) -> anyhow::Result<EntityKind> {
    EntityKind::parse(s).ok_or_else(|| anyhow!("unknown entity kind: {s}"))
}

fn handle_token(cmd: TokenCommands) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Encode { kind, id } => {
            let kind = parse_kind(&kind)?;
            println!("{}", token::codec().encode(kind, id));
        }
        TokenCommands::Decode { kind, token: tok } => {
            let kind = parse_kind(&kind)?;
            let id = token::codec()
                .decode(kind, &tok)
                .context("token did not decode for that kind")?;
            println!("{}", id);
        }
    }
    Ok(())
}

fn handle_config(cmd: ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let mut cfg = config::config().clone();
            cfg.security.token_key = "<redacted>".to_string();
            cfg.security.jwt_secret = "<redacted>".to_string();
            cfg.sms.api_key = "<redacted>".to_string();
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }
    Ok(())
}
