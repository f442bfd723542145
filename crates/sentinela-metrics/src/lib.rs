/*!
 * Sentinela Metrics
 *
 * Recomputação em lote, sem estado e idempotente, das métricas preparadas a
 * partir dos contadores diários e do razão de censura. Cada métrica é
 * substituída por inteiro (delete + insert) por chave: nunca fica meio
 * velha, meio nova.
 */

pub mod latency;
pub mod periods;
pub mod shares;

use periods::Period;
use sentinela_core::error::Result;
use sentinela_store::AnalyticsStore;
use serde_json::json;
use shares::{ValidatorShare, compliance_ratio, pool_rollup, share_table};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub struct MetricsAggregator {
    store: Arc<AnalyticsStore>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Recalcula e substitui todas as métricas preparadas
    pub async fn run_once(&self) -> Result<()> {
        self.update_censored_percentage().await?;
        self.update_overall_latency().await?;
        self.update_censored_latency().await?;
        self.update_lido_vs_rest().await?;
        self.update_validators_resistance_index().await?;
        self.update_validators_compliance_ratio().await?;
        Ok(())
    }

    async fn shares_for(&self, period: Period) -> Result<Vec<ValidatorShare>> {
        let metrics = self.store.all_day_metrics().await?;
        let sets = self
            .store
            .all_day_set_members(sentinela_store::analytics::day_set::NON_COMPLIANT_TXS)
            .await?;
        let dates: HashSet<String> = period.dates().into_iter().collect();
        Ok(share_table(&metrics, &sets, &dates))
    }

    /// Razão de resistência à censura por validador Lido, por período
    async fn update_validators_resistance_index(&self) -> Result<()> {
        for period in Period::ALL {
            info!(period = period.key_prefix(), "Calculando índice de resistência");
            let shares = self.shares_for(period).await?;
            let records: Vec<serde_json::Value> = shares
                .iter()
                .filter(|share| share.pool == "Lido")
                .map(|share| {
                    json!({
                        "name": share.name,
                        "ratio": compliance_ratio(
                            share.compliant_share,
                            share.non_compliant_share,
                        ),
                    })
                })
                .collect();
            let key = format!(
                "{}_validators_censorship_resistance_index",
                period.key_prefix()
            );
            self.store.replace_metric(&key, &json!(records)).await?;
            info!(metric = %key, "Métrica atualizada");
        }
        Ok(())
    }

    /// Participações conforme/não conforme por validador Lido, por período
    async fn update_validators_compliance_ratio(&self) -> Result<()> {
        for period in Period::ALL {
            info!(period = period.key_prefix(), "Calculando participações");
            let shares = self.shares_for(period).await?;
            let records: Vec<serde_json::Value> = shares
                .iter()
                .filter(|share| share.pool == "Lido")
                .map(|share| {
                    json!({
                        "name": share.name,
                        "ofac_compliant_share": share.compliant_share,
                        "ofac_non_compliant_share": share.non_compliant_share,
                    })
                })
                .collect();
            let key = format!("{}_validators_compliance_ratio", period.key_prefix());
            self.store.replace_metric(&key, &json!(records)).await?;
            info!(metric = %key, "Métrica atualizada");
        }
        Ok(())
    }

    /// Rollup Lido contra os demais pools, por período
    async fn update_lido_vs_rest(&self) -> Result<()> {
        for period in Period::ALL {
            info!(period = period.key_prefix(), "Calculando Lido contra o resto");
            let shares = self.shares_for(period).await?;
            let records: Vec<serde_json::Value> = pool_rollup(&shares)
                .into_iter()
                .map(|rollup| {
                    json!({
                        "pool": rollup.pool,
                        "ratio": rollup.ratio,
                        "total_share": rollup.total_share,
                    })
                })
                .collect();
            let key = format!(
                "{}_lido_vs_rest_censorship_resistance_index",
                period.key_prefix()
            );
            self.store.replace_metric(&key, &json!(records)).await?;
            info!(metric = %key, "Métrica atualizada");
        }
        Ok(())
    }

    /// Latência média de censura de todas as não conformes, por semana ISO
    async fn update_overall_latency(&self) -> Result<()> {
        info!("Calculando latência média geral");
        let records = self.weekly_latency(false).await?;
        self.store
            .replace_metric("overall_average_latency", &json!(records))
            .await?;
        info!("Latência média geral atualizada");
        Ok(())
    }

    /// Latência média e mediana apenas das efetivamente censuradas
    async fn update_censored_latency(&self) -> Result<()> {
        info!("Calculando latência das transações censuradas");
        let records = self.weekly_latency(true).await?;

        let averages: Vec<serde_json::Value> = records
            .iter()
            .map(|week| {
                json!({
                    "start_date": week["start_date"],
                    "end_date": week["end_date"],
                    "average_censorship_latency": week["average_censorship_latency"],
                    "average_censorship_latency_without_lido_censorship":
                        week["average_censorship_latency_without_lido_censorship"],
                })
            })
            .collect();
        self.store
            .replace_metric("censored_average_latency", &json!(averages))
            .await?;

        let medians: Vec<serde_json::Value> = records
            .iter()
            .map(|week| {
                json!({
                    "start_date": week["start_date"],
                    "end_date": week["end_date"],
                    "median_censorship_latency": week["median_censorship_latency"],
                    "median_censorship_latency_without_lido_censorship":
                        week["median_censorship_latency_without_lido_censorship"],
                })
            })
            .collect();
        self.store
            .replace_metric("censored_median_latency", &json!(medians))
            .await?;
        info!("Latência das censuradas atualizada");
        Ok(())
    }

    /// Série semanal de latências sobre o razão de não conformes
    async fn weekly_latency(&self, censored_only: bool) -> Result<Vec<serde_json::Value>> {
        let Some((min_ts, max_ts)) = self.store.censored_ts_range().await? else {
            return Ok(vec![]);
        };
        let lido_names = self.store.lido_validator_names().await?;

        let mut records = Vec::new();
        for (monday_ts, sunday_ts, start_date, end_date) in periods::weeks_between(min_ts, max_ts)
        {
            let rows = self.store.non_compliant_between(monday_ts, sunday_ts).await?;
            let scope: Vec<_> = if censored_only {
                rows.iter().filter(|row| !row.censored.is_empty()).collect()
            } else {
                rows.iter().collect()
            };

            let raw: Vec<i64> = scope.iter().map(|row| latency::raw_latency(&row.censored)).collect();
            let counterfactual: Vec<i64> = scope
                .iter()
                .map(|row| latency::lido_counterfactual_latency(&row.censored, &lido_names))
                .collect();

            records.push(json!({
                "start_date": start_date,
                "end_date": end_date,
                "average_censorship_latency": latency::mean(&raw),
                "average_censorship_latency_without_lido_censorship":
                    latency::mean(&counterfactual),
                "median_censorship_latency": latency::median(&raw),
                "median_censorship_latency_without_lido_censorship":
                    latency::median(&counterfactual),
            }));
        }
        Ok(records)
    }

    /// Percentual de não conformes que sofreram censura no último mês, e a
    /// fatia atribuível à Lido
    async fn update_censored_percentage(&self) -> Result<()> {
        info!("Calculando percentual de censuradas");
        let (start_ts, end_ts) = Period::LastMonth.bounds();
        let rows = self.store.non_compliant_between(start_ts, end_ts).await?;
        let lido_names = self.store.lido_validator_names().await?;

        let censored: Vec<_> = rows.iter().filter(|row| !row.censored.is_empty()).collect();
        let lido_censored = censored
            .iter()
            .filter(|row| {
                latency::raw_latency(&row.censored)
                    != latency::lido_counterfactual_latency(&row.censored, &lido_names)
            })
            .count();

        let denominator = rows.len();
        let record = if denominator == 0 {
            json!([{ "censored_percentage": 0.0, "lido_censored_percentage": 0.0 }])
        } else {
            json!([{
                "censored_percentage": 100.0 * censored.len() as f64 / denominator as f64,
                "lido_censored_percentage": 100.0 * lido_censored as f64 / denominator as f64,
            }])
        };
        self.store.replace_metric("censored_percentage", &record).await?;
        info!("Percentual de censuradas atualizado");
        Ok(())
    }
}
