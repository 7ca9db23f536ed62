//! Append-only result sinks.

use crate::error::PersistenceError;
use crate::models::{hex_address, hex_hash, AttackKey, SandwichAttack};
use alloy::primitives::B256;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Default block explorer transaction URL prefix.
pub const ETHERSCAN_TX: &str = "https://etherscan.io/tx/";

/// Column set and order of the CSV export. Downstream consumers rely on it.
pub const CSV_HEADER: [&str; 14] = [
    "frontrun_etherscan",
    "victim_etherscan",
    "backrun_etherscan",
    "block_number",
    "timestamp",
    "datetime_utc",
    "pair_address",
    "attacker_address",
    "frontrun_tx",
    "victim_tx",
    "backrun_tx",
    "num_victims",
    "revenue_eth",
    "revenue_raw",
];

const FRONTRUN_TX_COLUMN: usize = 8;
const BACKRUN_TX_COLUMN: usize = 10;
const NUM_VICTIMS_COLUMN: usize = 11;

/// Destination for detected attacks.
///
/// `append` must not return before the records are durable. Attacks whose
/// [`AttackKey`] is already recorded are skipped, so a block may be replayed
/// after a crash without duplicating output.
#[async_trait]
pub trait ResultSink: Send {
    /// Append one block's attacks, returning how many were newly recorded.
    async fn append(&mut self, attacks: &[SandwichAttack]) -> Result<usize, PersistenceError>;
}

/// CSV export with one row per victim.
pub struct CsvSink {
    path: PathBuf,
    explorer_tx_url: String,
    recorded: HashSet<AttackKey>,
}

impl CsvSink {
    /// Open or create the export at `path`.
    ///
    /// An existing file is scanned to rebuild the set of recorded attacks. A
    /// trailing partial row, or the rows of a trailing attack with fewer rows
    /// than its `num_victims`, are left by an interrupted write and cut off so
    /// that the attack is written again in full.
    pub fn open(
        path: impl AsRef<Path>,
        explorer_tx_url: impl Into<String>,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let mut sink = Self {
            path,
            explorer_tx_url: explorer_tx_url.into(),
            recorded: HashSet::new(),
        };

        if sink.truncate_partial_row()? {
            sink.load_recorded()?;
        } else {
            sink.write_header()?;
        }

        info!(
            "Opened result file {} with {} recorded sandwiches",
            sink.path.display(),
            sink.recorded.len()
        );
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recorded(&self) -> usize {
        self.recorded.len()
    }

    /// Returns `true` if complete rows remain in the file.
    fn truncate_partial_row(&self) -> Result<bool, PersistenceError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };

        let complete = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);

        if complete < contents.len() {
            warn!(
                "Discarding {} bytes of partial row at end of {}",
                contents.len() - complete,
                self.path.display()
            );
            self.truncate_to(complete as u64)?;
        }

        Ok(complete > 0)
    }

    fn truncate_to(&self, len: u64) -> Result<(), PersistenceError> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.set_len(len)
            .and_then(|_| file.sync_all())
            .map_err(|e| PersistenceError::io(&self.path, e))
    }

    fn write_header(&self) -> Result<(), PersistenceError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        let bytes = self.encoded(writer)?;

        let file = File::create(&self.path).map_err(|e| PersistenceError::io(&self.path, e))?;
        self.write_durably(file, &bytes)?;
        info!("Created {}", self.path.display());
        Ok(())
    }

    fn load_recorded(&mut self) -> Result<(), PersistenceError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        if !headers.iter().eq(CSV_HEADER.iter().copied()) {
            return Err(self.corrupt(format!("unexpected header {:?}", headers)));
        }

        // An attack's rows are written together, so they are contiguous.
        let mut groups: Vec<RowGroup> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let (key, expected) = self.parse_row(&record)?;
            match groups.last_mut() {
                Some(group) if group.key == key => group.rows += 1,
                _ => {
                    let offset = record
                        .position()
                        .map(|position| position.byte())
                        .ok_or_else(|| self.corrupt("row without position".to_string()))?;
                    groups.push(RowGroup {
                        key,
                        expected,
                        rows: 1,
                        offset,
                    });
                }
            }
        }
        drop(reader);

        if let Some(last) = groups.last() {
            if last.rows < last.expected {
                warn!(
                    "Discarding {} of {} rows of an interrupted sandwich at end of {}",
                    last.rows,
                    last.expected,
                    self.path.display()
                );
                self.truncate_to(last.offset)?;
                groups.pop();
            }
        }

        for group in &groups {
            if group.rows != group.expected {
                return Err(self.corrupt(format!(
                    "sandwich {:#x}/{:#x} has {} rows, expected {}",
                    group.key.frontrun_tx, group.key.backrun_tx, group.rows, group.expected
                )));
            }
            self.recorded.insert(group.key);
        }
        Ok(())
    }

    fn parse_row(
        &self,
        record: &csv::StringRecord,
    ) -> Result<(AttackKey, usize), PersistenceError> {
        let hash = |column: usize| {
            record
                .get(column)
                .and_then(|value| B256::from_str(value).ok())
        };
        let key = hash(FRONTRUN_TX_COLUMN)
            .zip(hash(BACKRUN_TX_COLUMN))
            .map(|(frontrun_tx, backrun_tx)| AttackKey {
                frontrun_tx,
                backrun_tx,
            });
        let expected = record
            .get(NUM_VICTIMS_COLUMN)
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|count| *count > 0);

        key.zip(expected)
            .ok_or_else(|| self.corrupt(format!("unreadable row {:?}", record)))
    }

    fn corrupt(&self, reason: String) -> PersistenceError {
        PersistenceError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }

    fn link(&self, hash: &B256) -> String {
        format!("{}{}", self.explorer_tx_url, hex_hash(hash))
    }

    fn rows(&self, attack: &SandwichAttack) -> Vec<[String; 14]> {
        let datetime = attack
            .datetime_utc()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        attack
            .victims
            .iter()
            .map(|victim| {
                [
                    self.link(&attack.frontrun.tx_hash),
                    self.link(&victim.tx_hash),
                    self.link(&attack.backrun.tx_hash),
                    attack.block_number.to_string(),
                    attack.timestamp.to_string(),
                    datetime.clone(),
                    hex_address(&attack.pair_id),
                    hex_address(&attack.attacker),
                    hex_hash(&attack.frontrun.tx_hash),
                    hex_hash(&victim.tx_hash),
                    hex_hash(&attack.backrun.tx_hash),
                    attack.num_victims().to_string(),
                    attack.revenue_eth.to_string(),
                    attack.revenue_raw.to_string(),
                ]
            })
            .collect()
    }

    fn encoded(&self, writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, PersistenceError> {
        writer
            .into_inner()
            .map_err(|e| PersistenceError::io(&self.path, e.into_error()))
    }

    fn write_durably(&self, mut file: File, bytes: &[u8]) -> Result<(), PersistenceError> {
        file.write_all(bytes)
            .and_then(|_| file.sync_data())
            .map_err(|e| PersistenceError::io(&self.path, e))
    }
}

/// Consecutive rows sharing one attack key.
struct RowGroup {
    key: AttackKey,
    expected: usize,
    rows: usize,
    offset: u64,
}

#[async_trait]
impl ResultSink for CsvSink {
    async fn append(&mut self, attacks: &[SandwichAttack]) -> Result<usize, PersistenceError> {
        let mut seen = HashSet::new();
        let fresh: Vec<&SandwichAttack> = attacks
            .iter()
            .filter(|attack| !self.recorded.contains(&attack.key()) && seen.insert(attack.key()))
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        // Encode the whole batch first so it reaches the file in one write.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for attack in &fresh {
            for row in self.rows(attack) {
                writer.write_record(&row)?;
            }
        }
        let bytes = self.encoded(writer)?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        self.write_durably(file, &bytes)?;

        self.recorded.extend(fresh.iter().map(|attack| attack.key()));
        Ok(fresh.len())
    }
}
