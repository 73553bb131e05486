//! Chart-ready projections of series: ordered labels plus parallel values

use super::resolution::Resolution;
use super::series::Series;
use super::types::{PricePoint, TotalPoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

pub fn labels_for<'a>(
    timestamps: impl Iterator<Item = &'a chrono::DateTime<chrono::Utc>>,
    resolution: &Resolution,
) -> Vec<String> {
    let format = resolution.label_format();
    timestamps.map(|t| t.format(format).to_string()).collect()
}

impl ChartData {
    /// Single price line for one item. `None` when the series is empty.
    pub fn for_item(
        item_name: &str,
        series: &Series<PricePoint>,
        resolution: &Resolution,
    ) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        Some(Self {
            labels: labels_for(series.iter().map(|p| &p.timestamp), resolution),
            datasets: vec![Dataset {
                label: format!("{} ({})", item_name, resolution),
                data: series.iter().map(|p| p.price).collect(),
            }],
        })
    }

    /// Total and average lines across all items.
    pub fn for_totals(series: &Series<TotalPoint>, resolution: &Resolution) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        Some(Self {
            labels: labels_for(series.iter().map(|p| &p.timestamp), resolution),
            datasets: vec![
                Dataset {
                    label: format!("Total price ({})", resolution),
                    data: series.iter().map(|p| p.total_price).collect(),
                },
                Dataset {
                    label: format!("Average price ({})", resolution),
                    data: series.iter().map(|p| p.average_price).collect(),
                },
            ],
        })
    }

    /// Overlay two item charts. The longer series supplies the labels.
    pub fn comparison(a: ChartData, b: ChartData) -> ChartData {
        let labels = if a.labels.len() >= b.labels.len() {
            a.labels
        } else {
            b.labels
        };
        let mut datasets = a.datasets;
        datasets.extend(b.datasets);
        ChartData { labels, datasets }
    }
}
