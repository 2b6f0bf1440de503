//! Produce a stored password hash for the `utilisateurs.password_hash` column
//!
//! ```bash
//! hash-password --password 's3cret'
//! echo 's3cret' | hash-password
//! ```

use std::io::BufRead;

use clap::Parser;
use rpa_dashboard::auth::hash_password;
use rpa_dashboard::config::defaults::{DEFAULT_PBKDF2_ITERATIONS, MIN_PBKDF2_ITERATIONS};

#[derive(Parser, Debug)]
#[command(name = "hash-password", about = "Hash a dashboard user password")]
struct CliArgs {
    /// Password to hash; read from stdin when omitted
    #[arg(long)]
    password: Option<String>,

    /// PBKDF2 iterations
    #[arg(long, default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
    iterations: u32,
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    if args.iterations < MIN_PBKDF2_ITERATIONS {
        anyhow::bail!("--iterations must be at least {MIN_PBKDF2_ITERATIONS}");
    }

    let password = match args.password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    println!("{}", hash_password(&password, args.iterations));
    Ok(())
}
