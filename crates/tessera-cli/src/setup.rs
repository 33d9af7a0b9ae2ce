//! First-run credentials wizard.
//!
//! When no credentials file is found, ask for the homeserver, user id and
//! room id, log in with a password, and write the file to the primary
//! location (the path given on the command line). Later runs then skip
//! straight to sending.

#![allow(clippy::print_stdout)]

use std::{
    io::{BufRead, Write as _},
    path::Path,
};

use tessera_client::{Credentials, HttpSession};

/// Errors from the setup wizard.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Reading an answer from the terminal failed.
    #[error("could not read from the terminal: {0}")]
    Terminal(#[from] std::io::Error),
    /// Logging in to the homeserver failed.
    #[error(transparent)]
    Login(#[from] tessera_client::SessionError),
    /// Writing the credentials file failed.
    #[error(transparent)]
    Store(#[from] tessera_client::CredentialsError),
}

fn ask(question: &str, default: &str) -> Result<String, std::io::Error> {
    print!("{question} [{default}] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() { default.to_owned() } else { answer.to_owned() })
}

/// Run the wizard and write the credentials file to `path`.
pub async fn run(path: &Path) -> Result<(), SetupError> {
    println!(
        "Credentials file \"{}\" was not found. First time use? Setting up new credentials.",
        path.display()
    );

    let mut homeserver = ask("Enter URL of your homeserver:", "https://example.org")?;
    if !homeserver.starts_with("http://") && !homeserver.starts_with("https://") {
        homeserver = format!("https://{homeserver}");
    }
    let user_id = ask("Enter your full user ID:", "@user:example.org")?;
    let room_id = ask("Enter your room ID:", "!room:example.org")?;
    let password = rpassword::prompt_password("Password: ")?;

    let mut session = HttpSession::new(&homeserver);
    let outcome = session.login(&user_id, &password).await?;

    let credentials = Credentials {
        homeserver,
        user_id: outcome.user_id,
        device_id: outcome.device_id,
        access_token: outcome.access_token,
        room_id,
    };
    credentials.store(path)?;

    println!(
        "Login was successful. Credentials were stored in \"{}\".\n\
         Run the program again to send a message. If you plan on having many\n\
         credentials files, consider moving them to your config directory.",
        path.display()
    );
    Ok(())
}
