//! CSV recorder with a background writer task

use crate::config::DataConfig;
use crate::position::Position;
use crate::signal::{signal_sources, Prediction};
use chrono::Utc;
use csv::{Writer, WriterBuilder};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const SIGNALS_FILE: &str = "signals.csv";
const OUTCOMES_FILE: &str = "outcomes.csv";

const OUTCOME_COLUMNS: [&str; 8] = [
    "timestamp",
    "market_id",
    "side",
    "confidence",
    "edge",
    "outcome",
    "won",
    "pnl_paper",
];

/// Column order for signals.csv: fixed prediction fields, then one score
/// column per registered signal
fn signal_columns() -> Vec<&'static str> {
    let mut columns = vec![
        "timestamp",
        "market_id",
        "question",
        "direction",
        "prob_up",
        "market_implied",
        "edge",
        "confidence",
    ];
    for source in signal_sources() {
        columns.push(source.name);
    }
    columns
}

enum RecorderEvent {
    Prediction(Box<Prediction>),
    Outcome(Box<Position>),
}

/// Recording statistics
#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub predictions_received: u64,
    pub predictions_written: u64,
    pub outcomes_received: u64,
    pub outcomes_written: u64,
    pub write_errors: u64,
    pub last_write: Option<chrono::DateTime<Utc>>,
}

/// Records predictions and resolved outcomes to CSV files
///
/// Writes happen on a background task; the logging calls are fire-and-forget
/// so a slow disk never stalls the evaluation loop.
pub struct DataRecorder {
    output_dir: PathBuf,
    tx: mpsc::Sender<RecorderEvent>,
    stats: Arc<RwLock<RecorderStats>>,
}

impl DataRecorder {
    /// Create the output directory, the CSV files with headers, and the
    /// background writer
    pub fn new(config: &DataConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        let signals = open_writer(&config.output_dir.join(SIGNALS_FILE), &signal_columns())?;
        let outcomes = open_writer(&config.output_dir.join(OUTCOMES_FILE), &OUTCOME_COLUMNS)?;

        let (tx, rx) = mpsc::channel(1024);
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let writer_stats = stats.clone();
        tokio::spawn(async move {
            run_writer(rx, signals, outcomes, writer_stats).await;
        });

        Ok(Self {
            output_dir: config.output_dir.clone(),
            tx,
            stats,
        })
    }

    /// Queue a prediction row; drops it with a warning if the queue is full
    pub fn log_prediction(&self, prediction: &Prediction) {
        let event = RecorderEvent::Prediction(Box::new(prediction.clone()));
        if self.tx.try_send(event).is_err() {
            tracing::warn!("recorder queue full, dropping prediction row");
        }
    }

    /// Queue an outcome row for a resolved position
    pub fn log_outcome(&self, position: &Position) {
        let event = RecorderEvent::Outcome(Box::new(position.clone()));
        if self.tx.try_send(event).is_err() {
            tracing::warn!("recorder queue full, dropping outcome row");
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Current statistics
    pub async fn stats(&self) -> RecorderStats {
        self.stats.read().await.clone()
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<RecorderEvent>,
    mut signals: Writer<File>,
    mut outcomes: Writer<File>,
    stats: Arc<RwLock<RecorderStats>>,
) {
    while let Some(event) = rx.recv().await {
        let result = match &event {
            RecorderEvent::Prediction(prediction) => {
                stats.write().await.predictions_received += 1;
                write_record(&mut signals, prediction_record(prediction))
            }
            RecorderEvent::Outcome(position) => {
                stats.write().await.outcomes_received += 1;
                write_record(&mut outcomes, outcome_record(position))
            }
        };

        match result {
            Ok(()) => {
                let mut s = stats.write().await;
                match event {
                    RecorderEvent::Prediction(_) => s.predictions_written += 1,
                    RecorderEvent::Outcome(_) => s.outcomes_written += 1,
                }
                s.last_write = Some(Utc::now());
            }
            Err(err) => {
                stats.write().await.write_errors += 1;
                tracing::error!(error = %err, "CSV append failed");
            }
        }
    }
    tracing::info!("recorder shutting down");
}

/// Open a CSV appender, writing the header row only for a fresh file
fn open_writer(path: &Path, columns: &[&str]) -> anyhow::Result<Writer<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let new_file = file.metadata()?.len() == 0;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if new_file {
        writer.write_record(columns)?;
        writer.flush()?;
        tracing::info!(path = ?path, "created CSV file");
    }
    Ok(writer)
}

fn write_record(writer: &mut Writer<File>, record: Vec<String>) -> anyhow::Result<()> {
    writer.write_record(&record)?;
    writer.flush()?;
    Ok(())
}

fn prediction_record(prediction: &Prediction) -> Vec<String> {
    let scores: HashMap<&str, f64> = prediction
        .signals
        .iter()
        .map(|s| (s.name, s.score))
        .collect();

    let mut fields = vec![
        prediction.timestamp.to_rfc3339(),
        prediction.market_id.clone(),
        prediction.question.clone(),
        prediction.direction.as_str().to_string(),
        format!("{:.4}", prediction.prob_up),
        format!("{:.4}", prediction.market_implied),
        format!("{:.4}", prediction.edge),
        format!("{:.4}", prediction.confidence),
    ];
    // Score columns in registry order, whatever order the signals arrived in
    for source in signal_sources() {
        fields.push(format!(
            "{:.4}",
            scores.get(source.name).copied().unwrap_or(0.0)
        ));
    }
    fields
}

fn outcome_record(position: &Position) -> Vec<String> {
    let (outcome, won, pnl) = match &position.resolution {
        Some(r) => (if r.won { "win" } else { "loss" }, r.won as u8, r.pnl),
        None => ("open", 0, rust_decimal::Decimal::ZERO),
    };
    vec![
        Utc::now().to_rfc3339(),
        position.market_id.clone(),
        position.side.as_str().to_string(),
        format!("{:.4}", position.confidence),
        format!("{:.4}", position.edge),
        outcome.to_string(),
        won.to_string(),
        pnl.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Resolution;
    use crate::signal::{Direction, Side};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn prediction() -> Prediction {
        Prediction {
            prob_up: 0.62,
            market_implied: 0.5,
            edge: 0.12,
            direction: Direction::Up,
            confidence: 0.62,
            signals: vec![],
            market_id: "mkt-1".to_string(),
            question: "Bitcoin Up or Down, 10AM?".to_string(),
            yes_token_id: String::new(),
            no_token_id: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn resolved_position() -> Position {
        Position {
            id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            question: "q".to_string(),
            side: Side::Up,
            confidence: 0.62,
            edge: 0.12,
            entry_price: dec!(95000),
            bet_usd: dec!(5),
            yes_token_id: String::new(),
            no_token_id: String::new(),
            opened_at: Utc::now(),
            horizon_secs: 300,
            grace_secs: 30,
            prediction: prediction(),
            resolution: Some(Resolution {
                won: true,
                pnl: dec!(3.06),
                exit_price: dec!(95100),
                resolved_at: Utc::now(),
            }),
        }
    }

    fn config(dir: &TempDir) -> DataConfig {
        DataConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_creates_files_with_headers() {
        let dir = TempDir::new().unwrap();
        let _recorder = DataRecorder::new(&config(&dir)).unwrap();

        let signals = std::fs::read_to_string(dir.path().join(SIGNALS_FILE)).unwrap();
        assert!(signals.starts_with("timestamp,market_id,question"));
        assert!(signals.contains("cvd_1m"));
        assert!(signals.contains("size_skew"));

        let outcomes = std::fs::read_to_string(dir.path().join(OUTCOMES_FILE)).unwrap();
        assert_eq!(outcomes.trim(), OUTCOME_COLUMNS.join(","));
    }

    #[tokio::test]
    async fn test_existing_files_not_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SIGNALS_FILE);
        std::fs::write(&path, "header\nexisting_row\n").unwrap();

        let _recorder = DataRecorder::new(&config(&dir)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("existing_row"));
    }

    #[tokio::test]
    async fn test_prediction_row_appended() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(&config(&dir)).unwrap();

        recorder.log_prediction(&prediction());
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let stats = recorder.stats().await;
        assert_eq!(stats.predictions_received, 1);
        assert_eq!(stats.predictions_written, 1);
        assert_eq!(stats.write_errors, 0);

        let content = std::fs::read_to_string(dir.path().join(SIGNALS_FILE)).unwrap();
        let rows: Vec<_> = content.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("mkt-1"));
        assert!(rows[1].contains("Up"));
        assert!(rows[1].contains("0.6200"));
        // The comma in the question forces quoting
        assert!(rows[1].contains("\"Bitcoin Up or Down, 10AM?\""));
    }

    #[tokio::test]
    async fn test_outcome_row_appended() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(&config(&dir)).unwrap();

        recorder.log_outcome(&resolved_position());
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let stats = recorder.stats().await;
        assert_eq!(stats.outcomes_written, 1);

        let content = std::fs::read_to_string(dir.path().join(OUTCOMES_FILE)).unwrap();
        let rows: Vec<_> = content.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("win"));
        assert!(rows[1].contains("3.06"));
    }

    #[tokio::test]
    async fn test_metacharacters_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(&config(&dir)).unwrap();

        let mut tricky = prediction();
        tricky.question = "Bitcoin \"flash\" dip, 3PM?".to_string();
        recorder.log_prediction(&tricky);
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut reader = csv::Reader::from_path(dir.path().join(SIGNALS_FILE)).unwrap();
        assert_eq!(&reader.headers().unwrap()[2], "question");
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[1], "mkt-1");
        assert_eq!(&record[2], "Bitcoin \"flash\" dip, 3PM?");
    }

    #[test]
    fn test_record_lengths_match_headers() {
        assert_eq!(prediction_record(&prediction()).len(), signal_columns().len());
        assert_eq!(outcome_record(&resolved_position()).len(), OUTCOME_COLUMNS.len());
    }
}
