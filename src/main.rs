// SPDX-License-Identifier: MIT
use anyhow::Result;
use service_telemetry::logger::{field, Logger};
use service_telemetry::telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[instrument(skip(logger))]
async fn simulated_work(logger: &Logger, order_id: u64) {
    info!(task = "simulated_work", "starting task");
    let cx = tracing::Span::current().context();
    logger
        .with_fields([field("order_id", order_id)])
        .info_ctx(&cx, "reserving stock");
    // Placeholder for actual business logic
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    info!(task = "simulated_work", "completed task");
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::default())?;
    let logger = telemetry.logger().clone();
    logger.info("application started");

    simulated_work(&logger, 42).await;

    logger.info("shutting down");
    telemetry.shutdown()?;
    Ok(())
}
