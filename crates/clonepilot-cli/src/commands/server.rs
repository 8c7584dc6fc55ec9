//! `clonepilot server` — Start the HTTP server.

pub async fn run(config: clonepilot_server::ServerConfig) -> Result<(), String> {
    println!("Starting clonepilot server on {}:{}...", config.host, config.port);

    let addr = clonepilot_server::start_server(config).await?;
    println!("clonepilot server listening on http://{}", addr);
    println!("Health check: GET http://{}/api/health", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
