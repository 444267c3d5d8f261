// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tollgate ask`: one request through the full broker pipeline.

use clap::Args;
use colored::Colorize;
use tollgate_broker::{Actor, AiRequest, Broker, BrokerResult};
use tollgate_config::TollgateConfig;
use tollgate_core::TollgateError;

#[derive(Args, Debug)]
pub struct AskArgs {
    pub organization: String,
    pub prompt: String,
    /// Usage type, e.g. `translation` or `CHAT_RESPONSE`. Inferred when omitted.
    #[arg(long)]
    pub usage_type: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Feature name passed as `metadata.feature`.
    #[arg(long)]
    pub feature: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,
    /// Print Prometheus metrics after the request.
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    pub metrics: bool,
}

impl AskArgs {
    fn request(&self) -> AiRequest {
        let mut request = AiRequest::new(self.organization.as_str(), self.prompt.as_str());
        request.usage_type = self.usage_type.clone();
        request.model = self.model.clone();
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.metadata = self
            .feature
            .as_ref()
            .map(|feature| serde_json::json!({ "feature": feature }));
        request.actor = self.user.as_ref().map(|user| Actor {
            user_id: Some(user.clone()),
            user_name: None,
        });
        request
    }
}

pub async fn run(config: TollgateConfig, args: AskArgs, color: bool) -> Result<(), TollgateError> {
    #[cfg(feature = "prometheus")]
    let exporter = if args.metrics {
        Some(tollgate_prometheus::PrometheusAdapter::new()?)
    } else {
        None
    };

    let broker = Broker::from_config(config).await?;
    let result = broker.process(args.request()).await;

    if args.json {
        let out = serde_json::to_string_pretty(&result)
            .map_err(|e| TollgateError::Internal(format!("failed to serialize result: {e}")))?;
        println!("{out}");
    } else {
        print_result(&result, color);
    }

    #[cfg(feature = "prometheus")]
    if let Some(exporter) = exporter {
        println!();
        print!("{}", exporter.render());
    }

    match &result.error {
        Some(error) => Err(TollgateError::Internal(format!(
            "{} ({})",
            error.message, error.kind
        ))),
        None => Ok(()),
    }
}

fn print_result(result: &BrokerResult, color: bool) {
    let Some(response) = &result.response else {
        return;
    };
    println!("{response}");
    println!();

    let cost = match (&result.cost, &result.currency) {
        (Some(cost), Some(currency)) => format!("{cost} {currency}"),
        _ => "-".to_string(),
    };
    let source = if result.cached { "cache" } else { "provider" };
    let line = format!(
        "{} via {}/{} from {source}, cost {cost}, tokens {}",
        result
            .usage_type
            .map(|u| u.to_string())
            .unwrap_or_default(),
        result.provider.as_deref().unwrap_or("-"),
        result.model.as_deref().unwrap_or("-"),
        result.usage.map(|u| u.total()).unwrap_or(0),
    );
    if color {
        eprintln!("{}", line.dimmed());
    } else {
        eprintln!("{line}");
    }
    if let Some(id) = &result.transaction_id {
        eprintln!("transaction {id}");
    }
}
