//! Codetrans CLI - command-line client for the translation server

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codetrans_core::Language;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde_json::Value;

/// Translate source code between Python, Java and C++ using a running
/// codetrans server.
///
/// Examples:
///   codetrans translate main.py --to java
///   cat Main.java | codetrans translate - --from java --to python
///   codetrans health
#[derive(Parser)]
#[command(
    name = "codetrans",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL
    #[arg(
        long,
        global = true,
        value_name = "URL",
        default_value = "http://localhost:8000",
        env = "CODETRANS_SERVER"
    )]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a source file and stream the result to stdout
    Translate {
        /// Source file, or `-` for stdin
        file: PathBuf,

        /// Target language (python, java, c++)
        #[arg(long, value_parser = parse_language)]
        to: Language,

        /// Source language; inferred by the model when omitted
        #[arg(long, value_parser = parse_language)]
        from: Option<Language>,
    },

    /// Show server health
    Health,
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_language: Option<Language>,
    target_language: Language,
}

fn parse_language(raw: &str) -> std::result::Result<Language, String> {
    Language::parse(raw).ok_or_else(|| {
        let choices: Vec<&str> = Language::ALL.iter().map(|l| l.as_str()).collect();
        format!("expected one of: {}", choices.join(", "))
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Translate { file, to, from } => translate(server, &file, to, from),
        Commands::Health => health(server),
    }
}

fn read_source(file: &PathBuf) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut code = String::new();
        io::stdin()
            .read_to_string(&mut code)
            .context("failed to read stdin")?;
        return Ok(code);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

fn translate(server: &str, file: &PathBuf, to: Language, from: Option<Language>) -> Result<()> {
    let code = read_source(file)?;
    let body = TranslateBody {
        code: &code,
        input_language: from,
        target_language: to,
    };

    // No overall timeout: long translations stream for minutes.
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(None)
        .build()?;
    let mut response = client
        .post(format!("{server}/translate-code/"))
        .json(&body)
        .send()
        .with_context(|| format!("could not reach {server}"))?;

    if !response.status().is_success() {
        bail!(describe_failure(response));
    }

    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        // Buffered server mode.
        let value: Value = response.json()?;
        let text = value
            .get("translated_code")
            .and_then(Value::as_str)
            .context("response has no translated_code")?;
        println!("{text}");
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    let mut buf = [0u8; 4096];
    loop {
        let n = response
            .read(&mut buf)
            .context("translation stream was interrupted")?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn health(server: &str) -> Result<()> {
    let response = Client::new()
        .get(format!("{server}/health"))
        .timeout(Duration::from_secs(10))
        .send()
        .with_context(|| format!("could not reach {server}"))?;

    if !response.status().is_success() {
        bail!(describe_failure(response));
    }

    let value: Value = response.json()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Render an error response: `{"error": ...}` or a field → messages map.
fn describe_failure(response: Response) -> String {
    let status = response.status();
    let value = match response.json::<Value>() {
        Ok(value) => value,
        Err(_) => return format!("server returned {status}"),
    };

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return format!("server returned {status}: {message}");
    }

    match value.as_object() {
        Some(fields) => {
            let mut lines = vec![format!("server rejected the request ({status}):")];
            for (field, messages) in fields {
                let joined = messages
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_else(|| messages.to_string());
                lines.push(format!("  {field}: {joined}"));
            }
            lines.join("\n")
        }
        None => format!("server returned {status}: {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_flags_accept_aliases() {
        assert_eq!(parse_language("cpp").unwrap(), Language::Cpp);
        assert_eq!(parse_language("Java").unwrap(), Language::Java);
        assert!(parse_language("rust").unwrap_err().contains("c++"));
    }

    #[test]
    fn request_body_omits_unknown_source_language() {
        let body = TranslateBody {
            code: "x = 1",
            input_language: None,
            target_language: Language::Cpp,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "code": "x = 1", "target_language": "c++" })
        );
    }

    #[test]
    fn cli_parses_translate_command() {
        let cli = Cli::try_parse_from(["codetrans", "translate", "-", "--to", "java", "--from", "python"])
            .unwrap();
        match cli.command {
            Commands::Translate { file, to, from } => {
                assert_eq!(file, PathBuf::from("-"));
                assert_eq!(to, Language::Java);
                assert_eq!(from, Some(Language::Python));
            }
            Commands::Health => panic!("expected translate"),
        }
    }
}
