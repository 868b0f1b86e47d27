//! Command-line parsing
//!
//! `auth-api-cli [--config PATH] [--metrics] <command> [args..]`

use anyhow::{Context, Result, bail};
use reqwest::Method;

pub const USAGE: &str = "usage: auth-api-cli [--config PATH] [--metrics] <command>

commands:
  login <email>                    password is read from AUTH_PASSWORD
  register <json>                  registration body, e.g. '{\"email\":..}'
  logout
  whoami
  request <METHOD> <path> [json]   authenticated call, e.g. request GET /courses";

#[derive(Debug, PartialEq)]
pub struct Invocation {
    pub config: Option<String>,
    pub metrics: bool,
    pub command: Command,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Login {
        email: String,
    },
    Register {
        body: serde_json::Value,
    },
    Logout,
    Whoami,
    Request {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Invocation> {
    let mut config = None;
    let mut metrics = false;
    let mut rest = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config = Some(path.clone());
            }
            "--metrics" => metrics = true,
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        ["login", email] => Command::Login {
            email: email.to_string(),
        },
        ["register", body] => Command::Register {
            body: parse_json(body)?,
        },
        ["logout"] => Command::Logout,
        ["whoami"] => Command::Whoami,
        ["request", method, path] => Command::Request {
            method: parse_method(method)?,
            path: parse_path(path)?,
            body: None,
        },
        ["request", method, path, body] => Command::Request {
            method: parse_method(method)?,
            path: parse_path(path)?,
            body: Some(parse_json(body)?),
        },
        [] => bail!("missing command\n\n{USAGE}"),
        [other, ..] => bail!("unrecognized command or arguments: {other}\n\n{USAGE}"),
    };

    Ok(Invocation {
        config,
        metrics,
        command,
    })
}

fn parse_json(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("invalid JSON argument: {raw}"))
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {raw}"))
}

fn parse_path(raw: &str) -> Result<String> {
    if !raw.starts_with('/') {
        bail!("path must start with '/', got: {raw}");
    }
    Ok(raw.to_string())
}
