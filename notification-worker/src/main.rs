//! Notification Worker - consumes RabbitMQ queues and sends notification emails.
//!
//! Each registered queue is served by its own dispatch loop. The worker runs
//! until SIGINT/SIGTERM or until every queue's consumer has been closed.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notifier::{
    shutdown::shutdown_signal, AmqpConnection, Config, Dispatcher, SmtpEmailSender,
    UserVerificationEmailHandler, USER_VERIFICATION_QUEUE,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("worker_starting");

    let config = Config::from_env();
    info!(
        app_env = %config.app_env,
        rabbitmq_url_set = !config.rabbitmq_url.is_empty(),
        smtp_enabled = config.smtp.enabled,
        smtp_host = %config.smtp.host,
        smtp_port = config.smtp.port,
        smtp_credentials_set = config.smtp.username.is_some() && config.smtp.password.is_some(),
        "config_loaded"
    );

    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "worker_failed");
        return Err(e);
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let email_sender =
        SmtpEmailSender::new(&config.smtp).context("Failed to initialize email sender")?;

    let broker = AmqpConnection::open(&config.rabbitmq_url)
        .await
        .context("Failed to initialize RabbitMQ")?;

    let mut dispatcher = Dispatcher::new(Arc::new(broker));

    // Startup errors close the connection before propagating
    if let Err(e) = start(&mut dispatcher, &config, Arc::new(email_sender)).await {
        dispatcher.close().await;
        dispatcher.join().await;
        return Err(e);
    }

    info!(queues = ?dispatcher.queues().collect::<Vec<_>>(), "worker_ready");

    dispatcher.wait(shutdown_signal()).await;

    info!("worker_stopping");
    dispatcher.close().await;
    dispatcher.join().await;

    info!("worker_shutdown_complete");
    Ok(())
}

async fn start(
    dispatcher: &mut Dispatcher<AmqpConnection>,
    config: &Config,
    email_sender: Arc<SmtpEmailSender>,
) -> Result<()> {
    let verification = UserVerificationEmailHandler::new(email_sender, &config.verification_base_url)
        .context("Invalid VERIFICATION_BASE_URL")?;

    dispatcher
        .register(USER_VERIFICATION_QUEUE, Arc::new(verification))
        .await
        .context("Failed to register queue")?;

    dispatcher
        .start_all()
        .await
        .context("Failed to start listening")?;

    Ok(())
}
