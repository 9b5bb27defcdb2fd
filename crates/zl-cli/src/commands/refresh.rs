//! Refresh command implementation
//!
//! Daemons run `<refresh command>` whenever they need a fresh id token and
//! read the token from stdout.

use anyhow::Result;

use crate::context::CliContext;

/// Print the id token from the configured auth header
pub fn refresh_command(ctx: &CliContext) -> Result<u8> {
    let token = ctx
        .config
        .service
        .auth_header
        .as_deref()
        .map(token_from_header)
        .filter(|token| !token.is_empty());

    match token {
        Some(token) => {
            println!("{}", token);
            Ok(0)
        }
        None => anyhow::bail!("Not logged in: no auth header configured"),
    }
}

fn token_from_header(header: &str) -> &str {
    header.strip_prefix("Bearer ").unwrap_or(header).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_prefix_is_stripped() {
        assert_eq!(token_from_header("Bearer abc.def"), "abc.def");
        assert_eq!(token_from_header("abc.def "), "abc.def");
    }
}
