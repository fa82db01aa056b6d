use std::io;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = cqlkit_demos::application::run_custom_payload().await {
        eprintln!("[custom_payload] run failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
