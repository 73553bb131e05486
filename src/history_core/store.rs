//! JSON persistence for all series
//!
//! Layout under the history directory:
//!
//! ```text
//! history_<res>.json      item_id -> { item_name, points, labels, values }
//! total_price_<res>.json  { points, labels, total_values, average_values }
//! raw_samples.json        { items: item_id -> [sample], totals: [sample] }
//! current_prices.json     item_id -> { item_name, price, status, last_updated }
//! ```
//!
//! `labels`/`values` are always rebuilt from `points` on save and ignored on
//! load. A series that fails validation is dropped on its own; the rest of the
//! file still loads.

use super::chart::{labels_for, ChartData};
use super::error::{HistoryError, HistoryResult};
use super::resolution::Resolution;
use super::ring_buffer::RingBuffer;
use super::series::{Series, SeriesPoint};
use super::state::{CurrentPrice, HistoryState};
use super::types::{PricePoint, TotalPoint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedItemSeries {
    #[serde(default)]
    item_name: Option<String>,
    points: Vec<PricePoint>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    values: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTotalSeries {
    points: Vec<TotalPoint>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    total_values: Vec<u64>,
    #[serde(default)]
    average_values: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct PersistedRawSamples {
    items: BTreeMap<String, Vec<PricePoint>>,
    totals: Vec<TotalPoint>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub series_loaded: usize,
    /// Series or buffers discarded for failing validation
    pub malformed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl SaveReport {
    pub fn failed_writes(&self) -> usize {
        self.failed.len()
    }

    fn record(&mut self, path: PathBuf, result: HistoryResult<()>) {
        match result {
            Ok(()) => self.written.push(path),
            Err(e) => {
                log::error!("{}", e);
                self.failed.push((path, e.to_string()));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionStats {
    pub resolution: String,
    pub items_with_data: usize,
    pub max_points: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStatistics {
    pub total_items: usize,
    pub resolutions: Vec<ResolutionStats>,
}

pub struct SeriesStore {
    dir: PathBuf,
    resolutions: Vec<Resolution>,
    raw_capacity: usize,
}

impl SeriesStore {
    pub fn new(dir: impl Into<PathBuf>, resolutions: Vec<Resolution>, raw_capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            resolutions,
            raw_capacity,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    pub fn history_path(&self, resolution: &Resolution) -> PathBuf {
        self.dir.join(format!("history_{}.json", resolution))
    }

    pub fn total_path(&self, resolution: &Resolution) -> PathBuf {
        self.dir.join(format!("total_price_{}.json", resolution))
    }

    pub fn raw_path(&self) -> PathBuf {
        self.dir.join("raw_samples.json")
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join("current_prices.json")
    }

    /// Read everything on disk. Never fails: missing files start empty and
    /// malformed series are reset individually.
    pub fn load(&self) -> (HistoryState, LoadReport) {
        let mut state = HistoryState::new(self.raw_capacity);
        let mut report = LoadReport::default();

        for resolution in &self.resolutions {
            self.load_item_series(&mut state, resolution, &mut report);
            self.load_total_series(&mut state, resolution, &mut report);
        }
        self.load_raw(&mut state, &mut report);
        self.load_current(&mut state, &mut report);

        log::info!(
            "Loaded price history from {}: {} items, {} series ({} malformed)",
            self.dir.display(),
            state.item_series.len(),
            report.series_loaded,
            report.malformed
        );
        (state, report)
    }

    fn load_item_series(
        &self,
        state: &mut HistoryState,
        resolution: &Resolution,
        report: &mut LoadReport,
    ) {
        let path = self.history_path(resolution);
        let Some(entries) = read_object(&path, report) else {
            return;
        };

        for (item_id, value) in entries {
            let parsed = parse_series::<PersistedItemSeries>(&path, &item_id, value).and_then(
                |persisted| {
                    if let Some(point) = persisted.points.iter().find(|p| p.item_id != item_id) {
                        let reason = format!("point belongs to {}", point.item_id);
                        return Err(malformed(&path, &item_id, reason));
                    }
                    let series = Series::from_points(persisted.points, resolution.maxlen())
                        .map_err(|reason| malformed(&path, &item_id, reason))?;
                    Ok((persisted.item_name, series))
                },
            );

            match parsed {
                Ok((item_name, series)) => {
                    if let Some(name) = item_name {
                        state.item_names.insert(item_id.clone(), name);
                    }
                    *state.series_mut(&item_id, resolution) = series;
                    report.series_loaded += 1;
                }
                Err(e) => {
                    log::warn!("{}; starting empty", e);
                    report.malformed += 1;
                }
            }
        }
    }

    fn load_total_series(
        &self,
        state: &mut HistoryState,
        resolution: &Resolution,
        report: &mut LoadReport,
    ) {
        let path = self.total_path(resolution);
        let Some(value) = read_value(&path, report) else {
            return;
        };

        let parsed = parse_series::<PersistedTotalSeries>(&path, "totals", value).and_then(
            |persisted| {
                Series::from_points(persisted.points, resolution.maxlen())
                    .map_err(|reason| malformed(&path, "totals", reason))
            },
        );
        match parsed {
            Ok(series) => {
                state.total_series.insert(resolution.as_str().to_string(), series);
                report.series_loaded += 1;
            }
            Err(e) => {
                log::warn!("{}; starting empty", e);
                report.malformed += 1;
            }
        }
    }

    fn load_raw(&self, state: &mut HistoryState, report: &mut LoadReport) {
        let path = self.raw_path();
        let Some(mut root) = read_object(&path, report) else {
            return;
        };

        if let Some(items) = root.remove("items") {
            match items {
                Value::Object(items) => {
                    for (item_id, value) in items {
                        let parsed =
                            parse_buffer::<PricePoint>(&path, &item_id, value, self.raw_capacity);
                        match parsed {
                            Ok(buffer) if buffer.iter().all(|p| p.item_id == item_id) => {
                                state.raw.restore(&item_id, buffer.to_vec());
                            }
                            Ok(_) => {
                                log::warn!(
                                    "Raw samples for {} carry a foreign item_id; starting empty",
                                    item_id
                                );
                                report.malformed += 1;
                            }
                            Err(e) => {
                                log::warn!("{}; starting empty", e);
                                report.malformed += 1;
                            }
                        }
                    }
                }
                _ => {
                    log::warn!(
                        "{}: 'items' is not an object; raw buffers start empty",
                        path.display()
                    );
                    report.malformed += 1;
                }
            }
        }

        if let Some(totals) = root.remove("totals") {
            match parse_buffer::<TotalPoint>(&path, "totals", totals, self.raw_capacity) {
                Ok(buffer) => state.total_samples = buffer,
                Err(e) => {
                    log::warn!("{}; starting empty", e);
                    report.malformed += 1;
                }
            }
        }
    }

    fn load_current(&self, state: &mut HistoryState, report: &mut LoadReport) {
        let path = self.current_path();
        let Some(entries) = read_object(&path, report) else {
            return;
        };

        for (item_id, value) in entries {
            match parse_series::<CurrentPrice>(&path, &item_id, value) {
                Ok(current) if current.price > 0 => {
                    state
                        .item_names
                        .entry(item_id.clone())
                        .or_insert_with(|| current.item_name.clone());
                    state.current.insert(item_id, current);
                }
                Ok(_) => {
                    log::warn!("Current price for {} is not positive; ignoring", item_id);
                    report.malformed += 1;
                }
                Err(e) => {
                    log::warn!("{}; ignoring", e);
                    report.malformed += 1;
                }
            }
        }
    }

    /// Rewrite every file. A failed file is logged and counted; the remaining
    /// files are still written.
    pub fn save(&self, state: &HistoryState) -> SaveReport {
        let mut report = SaveReport::default();

        for resolution in &self.resolutions {
            let path = self.history_path(resolution);
            let result = self
                .render_item_series(state, resolution)
                .and_then(|json| write_atomic(&path, &json));
            report.record(path, result);

            let path = self.total_path(resolution);
            let result = self
                .render_total_series(state, resolution)
                .and_then(|json| write_atomic(&path, &json));
            report.record(path, result);
        }

        let path = self.raw_path();
        let raw = PersistedRawSamples {
            items: state
                .raw
                .iter()
                .map(|(item_id, buffer)| (item_id.clone(), buffer.to_vec()))
                .collect(),
            totals: state.total_samples.to_vec(),
        };
        let result = to_json(&raw).and_then(|json| write_atomic(&path, &json));
        report.record(path, result);

        let path = self.current_path();
        let result = to_json(&state.current).and_then(|json| write_atomic(&path, &json));
        report.record(path, result);

        log::info!(
            "Saved price history: {} files written, {} failed",
            report.written.len(),
            report.failed_writes()
        );
        report
    }

    fn render_item_series(
        &self,
        state: &HistoryState,
        resolution: &Resolution,
    ) -> HistoryResult<String> {
        let mut out: BTreeMap<&str, PersistedItemSeries> = BTreeMap::new();
        for (item_id, by_res) in &state.item_series {
            let Some(series) = by_res.get(resolution.as_str()) else {
                continue;
            };
            let points = series.to_vec();
            out.insert(
                item_id,
                PersistedItemSeries {
                    item_name: state.item_names.get(item_id).cloned(),
                    labels: labels_for(points.iter().map(|p| &p.timestamp), resolution),
                    values: points.iter().map(|p| p.price).collect(),
                    points,
                },
            );
        }
        to_json(&out)
    }

    fn render_total_series(
        &self,
        state: &HistoryState,
        resolution: &Resolution,
    ) -> HistoryResult<String> {
        let points = state
            .total_series(resolution)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        to_json(&PersistedTotalSeries {
            labels: labels_for(points.iter().map(|p| &p.timestamp), resolution),
            total_values: points.iter().map(|p| p.total_price).collect(),
            average_values: points.iter().map(|p| p.average_price).collect(),
            points,
        })
    }

    /// Write one item's chart to `<item_id>_<res>.json`. Returns `None` when
    /// the item has no data at that resolution.
    pub fn export_chart(
        &self,
        state: &HistoryState,
        item_id: &str,
        resolution: &Resolution,
    ) -> HistoryResult<Option<PathBuf>> {
        let stem = export_stem(item_id)?;
        let Some(chart) = state.series(item_id, resolution).and_then(|series| {
            ChartData::for_item(state.item_name(item_id), series, resolution)
        }) else {
            return Ok(None);
        };
        let path = self.dir.join(format!("{}_{}.json", stem, resolution));
        write_atomic(&path, &to_json(&chart)?)?;
        Ok(Some(path))
    }

    /// Write the total/average chart to `total_chart_<res>.json`
    pub fn export_total_chart(
        &self,
        state: &HistoryState,
        resolution: &Resolution,
    ) -> HistoryResult<Option<PathBuf>> {
        let Some(chart) = state
            .total_series(resolution)
            .and_then(|series| ChartData::for_totals(series, resolution))
        else {
            return Ok(None);
        };
        let path = self.dir.join(format!("total_chart_{}.json", resolution));
        write_atomic(&path, &to_json(&chart)?)?;
        Ok(Some(path))
    }

    /// Overlay two items' charts into `comparison_<a>_<b>_<res>.json`.
    /// `None` unless both items have data at that resolution.
    pub fn export_comparison(
        &self,
        state: &HistoryState,
        item_a: &str,
        item_b: &str,
        resolution: &Resolution,
    ) -> HistoryResult<Option<PathBuf>> {
        let (stem_a, stem_b) = (export_stem(item_a)?, export_stem(item_b)?);
        let chart_for = |item_id: &str| {
            state.series(item_id, resolution).and_then(|series| {
                ChartData::for_item(state.item_name(item_id), series, resolution)
            })
        };
        let (Some(a), Some(b)) = (chart_for(item_a), chart_for(item_b)) else {
            return Ok(None);
        };
        let path = self
            .dir
            .join(format!("comparison_{}_{}_{}.json", stem_a, stem_b, resolution));
        write_atomic(&path, &to_json(&ChartData::comparison(a, b))?)?;
        Ok(Some(path))
    }

    pub fn statistics(&self, state: &HistoryState) -> HistoryStatistics {
        let resolutions = self
            .resolutions
            .iter()
            .map(|resolution| ResolutionStats {
                resolution: resolution.as_str().to_string(),
                items_with_data: state
                    .item_series
                    .values()
                    .filter(|by_res| by_res.get(resolution.as_str()).is_some_and(|s| !s.is_empty()))
                    .count(),
                max_points: resolution.maxlen(),
            })
            .collect();

        HistoryStatistics {
            total_items: state.item_series.len(),
            resolutions,
        }
    }
}

fn malformed(path: &Path, series: &str, reason: impl Into<String>) -> HistoryError {
    HistoryError::MalformedState {
        path: path.to_path_buf(),
        series: series.to_string(),
        reason: reason.into(),
    }
}

fn parse_series<T: DeserializeOwned>(path: &Path, series: &str, value: Value) -> HistoryResult<T> {
    serde_json::from_value(value).map_err(|e| malformed(path, series, e.to_string()))
}

fn parse_buffer<T: SeriesPoint + DeserializeOwned>(
    path: &Path,
    series: &str,
    value: Value,
    capacity: usize,
) -> HistoryResult<RingBuffer<T>> {
    let points: Vec<T> = parse_series(path, series, value)?;
    let series_check =
        Series::from_points(points, capacity).map_err(|reason| malformed(path, series, reason))?;
    Ok(RingBuffer::from_vec(series_check.to_vec(), capacity))
}

/// `None` for a missing or unreadable file; the latter is counted as malformed.
fn read_value(path: &Path, report: &mut LoadReport) -> Option<Value> {
    if !path.exists() {
        log::debug!("No history file at {}", path.display());
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(reason) => {
            log::warn!("Unreadable history file {}: {}; starting empty", path.display(), reason);
            report.malformed += 1;
            None
        }
    }
}

fn read_object(path: &Path, report: &mut LoadReport) -> Option<Map<String, Value>> {
    match read_value(path, report)? {
        Value::Object(map) => Some(map),
        _ => {
            log::warn!("History file {} is not a JSON object; starting empty", path.display());
            report.malformed += 1;
            None
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> HistoryResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write to a sibling temp file and rename over the target.
fn write_atomic(path: &Path, contents: &str) -> HistoryResult<()> {
    let io_err = |source| HistoryError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(source));
    }
    Ok(())
}

/// Item ids become file name stems in chart exports
fn export_stem(item_id: &str) -> HistoryResult<&str> {
    let unsafe_id = item_id.is_empty()
        || item_id == "."
        || item_id == ".."
        || item_id.contains(['/', '\\', '\0']);
    if unsafe_id {
        return Err(HistoryError::InvalidItemId {
            item_id: item_id.to_string(),
        });
    }
    Ok(item_id)
}
