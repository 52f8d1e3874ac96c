use std::process::ExitCode;

use cha::terminal::{Style, paint};

#[tokio::main]
async fn main() -> ExitCode {
    match cha::run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", paint(Style::Error, &format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}
