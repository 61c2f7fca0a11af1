use aws_lambda_events::event::eventbridge::EventBridgeEvent;
use function_timer::time;
use lambda_runtime::{Error, LambdaEvent};
use metrics_cloudwatch_embedded::lambda::handler::run;
use tracing::info_span;

use peloton_warehouse::EtlJob;
use peloton_warehouse::common::{config::Config, metrics};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .with_current_span(false)
        .without_time()
        .init();

    let metrics = metrics_cloudwatch_embedded::Builder::new()
        .cloudwatch_namespace(metrics::METRICS_NAMESPACE)
        .lambda_cold_start_span(info_span!("cold start"))
        .lambda_cold_start_metric("ColdStart")
        .with_lambda_request_id("RequestId")
        .init()?;

    run(metrics, function_handler).await
}

/// Runs the full Peloton to BigQuery load on each scheduled EventBridge event.
#[time("lambda_handler_duration")]
pub(crate) async fn function_handler(event: LambdaEvent<EventBridgeEvent>) -> Result<(), Error> {
    let (payload, _context) = event.into_parts();
    tracing::info!(
        "Scheduled event: {:?} from {:?}",
        payload.detail_type,
        payload.source
    );

    let config =
        Config::from_env().map_err(|e| Error::from(format!("Invalid configuration: {e}")))?;

    let job = EtlJob::from_config(&config)
        .await
        .map_err(|e| Error::from(format!("Failed to prepare ETL job: {e}")))?;

    match job.run().await {
        Ok(report) => {
            tracing::info!("ETL report: {:?}", report);
            metrics::increment_lambda_success();
            Ok(())
        }
        Err(e) => {
            tracing::error!("ETL run failed: {}", e);
            metrics::increment_lambda_failure();
            Err(Error::from(format!("ETL run failed: {e}")))
        }
    }
}
