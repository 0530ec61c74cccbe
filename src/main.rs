use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match remedy::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(remedy::errors::get_exit_code(&e))
        }
    }
}
