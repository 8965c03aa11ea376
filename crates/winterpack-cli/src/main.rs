mod cli;
mod logging;
mod startup;
mod update;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = update::update_error(&err).and_then(update::user_hint) {
                eprintln!("{hint}");
            }
            let code = u8::try_from(update::exit_code(&err)).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
