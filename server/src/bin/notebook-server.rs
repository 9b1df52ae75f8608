//! Entry point: load config, build application state, serve.

use notebook_server::{AppState, Config};

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(err) => {
			tracing::error!("{err}");
			std::process::exit(1);
		}
	};
	let listen_addr = config.listen_addr.clone();

	let state = match AppState::new(config).await {
		Ok(state) => state,
		Err(err) => {
			tracing::error!("failed to initialize application state: {err}");
			std::process::exit(1);
		}
	};

	let app = notebook_server::routes::init(state);

	let listener = match tokio::net::TcpListener::bind(listen_addr.as_ref()).await {
		Ok(listener) => listener,
		Err(err) => {
			tracing::error!("failed to bind {listen_addr}: {err}");
			std::process::exit(1);
		}
	};

	tracing::info!("listening on {}", listen_addr);
	if let Err(err) = axum::serve(listener, app).await {
		tracing::error!("server error: {err}");
		std::process::exit(1);
	}
}

// vim: ts=4
