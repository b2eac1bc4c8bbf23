//! SQLite-backed store with AES-GCM encryption of payload columns.
//! Key derived from device-bound secret (in production: Secure Enclave / Keystore / DPAPI).

use crate::error::{EngineError, Result};
use crate::events::ThreatEvent;
use crate::learning::{LocalLearner, TrainingSample};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| EngineError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EngineError::Crypto("encrypt failed".into()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| EngineError::Crypto(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(EngineError::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| EngineError::Crypto(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ct)
        .map_err(|_| EngineError::Crypto("decrypt failed (wrong key or tampered payload)".into()))
}

const DEFAULT_MAX_SAMPLES: u64 = 10_000;

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
    max_samples: u64,
}

impl SecureStore {
    /// Open or create DB at path. Key is derived from `secret` (in production: device-bound).
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS threat_events (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                age_group TEXT NOT NULL,
                threat_type TEXT NOT NULL,
                severity REAL NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_threat_events_ts ON threat_events(ts);
            CREATE TABLE IF NOT EXISTS training_samples (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_training_samples_ts ON training_samples(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
            max_samples: DEFAULT_MAX_SAMPLES,
        })
    }

    /// Cap on stored training samples; oldest are dropped first.
    pub fn with_sample_limit(mut self, max_samples: u64) -> Self {
        self.max_samples = max_samples;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Storage("connection lock poisoned".into()))
    }

    /// Append a threat event (payload stored encrypted).
    pub fn insert_threat_event(&self, event: &ThreatEvent) -> Result<()> {
        let enc = encrypt(&self.key, serde_json::to_string(event)?.as_bytes())?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO threat_events (id, ts, age_group, threat_type, severity, payload_enc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.ts.timestamp_millis(),
                event.age_group.as_str(),
                event.assessment.threat_type.as_str(),
                event.severity(),
                enc
            ],
        )?;
        Ok(())
    }

    pub fn get_threat_event(&self, id: &str) -> Result<Option<ThreatEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT payload_enc FROM threat_events WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            let enc: String = row.get(0)?;
            let plain = decrypt(&self.key, &enc)?;
            return Ok(Some(serde_json::from_slice(&plain)?));
        }
        Ok(None)
    }

    /// Most recent `limit` events, newest first.
    pub fn recent_threat_events(&self, limit: usize) -> Result<Vec<ThreatEvent>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload_enc FROM threat_events ORDER BY ts DESC LIMIT ?1")?;
        let encoded: Vec<String> = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        encoded
            .iter()
            .map(|enc| Ok(serde_json::from_slice(&decrypt(&self.key, enc)?)?))
            .collect()
    }

    /// Events with `ts >= since_ms`, oldest first.
    pub fn threat_events_since(&self, since_ms: i64) -> Result<Vec<ThreatEvent>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload_enc FROM threat_events WHERE ts >= ?1 ORDER BY ts ASC")?;
        let encoded: Vec<String> = stmt
            .query_map(params![since_ms], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        encoded
            .iter()
            .map(|enc| Ok(serde_json::from_slice(&decrypt(&self.key, enc)?)?))
            .collect()
    }

    pub fn insert_training_sample(&self, sample: &TrainingSample) -> Result<()> {
        let enc = encrypt(&self.key, serde_json::to_string(sample)?.as_bytes())?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO training_samples (id, ts, payload_enc) VALUES (?1, ?2, ?3)",
            params![sample.id, sample.recorded_at.timestamp_millis(), enc],
        )?;
        Ok(())
    }

    pub fn training_samples(&self) -> Result<Vec<TrainingSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT payload_enc FROM training_samples ORDER BY ts ASC")?;
        let encoded: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        encoded
            .iter()
            .map(|enc| Ok(serde_json::from_slice(&decrypt(&self.key, enc)?)?))
            .collect()
    }

    pub fn training_sample_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM training_samples", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Keep only the newest `keep` training samples.
    pub fn trim_training_samples(&self, keep: u64) -> Result<u64> {
        let n = self.conn()?.execute(
            "DELETE FROM training_samples WHERE id NOT IN
             (SELECT id FROM training_samples ORDER BY ts DESC LIMIT ?1)",
            params![keep as i64],
        )?;
        Ok(n as u64)
    }

    /// Retention: delete events and samples older than given timestamp
    pub fn prune_before(&self, ts_ms: i64) -> Result<u64> {
        let conn = self.conn()?;
        let a = conn.execute("DELETE FROM threat_events WHERE ts < ?1", params![ts_ms])?;
        let b = conn.execute("DELETE FROM training_samples WHERE ts < ?1", params![ts_ms])?;
        Ok((a + b) as u64)
    }
}

impl LocalLearner for SecureStore {
    fn learn(&self, sample: &TrainingSample) -> Result<()> {
        self.insert_training_sample(sample)?;
        if self.training_sample_count()? > self.max_samples {
            self.trim_training_samples(self.max_samples)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::AssessmentInput;
    use crate::policy::AgeGroup;
    use crate::protection::{DetectedThreat, ProtectionDomain};
    use crate::response;
    use crate::risk::{ThreatAssessment, ThreatType};

    fn event(level: f64) -> ThreatEvent {
        let input = AssessmentInput::text(ProtectionDomain::Financial, "wire transfer now");
        let detected = DetectedThreat::new(ProtectionDomain::Financial, ThreatType::FinancialFraud, level, input);
        let assessment = ThreatAssessment::new(level, 0.8, ThreatType::FinancialFraud);
        let resp = response::generate(&assessment, AgeGroup::Adult);
        ThreatEvent::new(detected, assessment, resp, AgeGroup::Adult)
    }

    #[test]
    fn threat_event_roundtrip_is_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SecureStore::open(&path, b"test-secret").unwrap();
        let ev = event(0.9);
        store.insert_threat_event(&ev).unwrap();

        let back = store.get_threat_event(&ev.id).unwrap().unwrap();
        assert_eq!(back.id, ev.id);
        assert_eq!(back.assessment, ev.assessment);

        let raw: String = store
            .conn()
            .unwrap()
            .query_row("SELECT payload_enc FROM threat_events", [], |r| r.get(0))
            .unwrap();
        assert!(!raw.contains("wire transfer"));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let ev = event(0.9);
        SecureStore::open(&path, b"right").unwrap().insert_threat_event(&ev).unwrap();
        let other = SecureStore::open(&path, b"wrong").unwrap();
        assert!(matches!(other.get_threat_event(&ev.id), Err(EngineError::Crypto(_))));
    }

    #[test]
    fn learning_keeps_newest_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("s.db"), b"k")
            .unwrap()
            .with_sample_limit(2);
        for i in 0..4 {
            let mut sample = TrainingSample::new(
                AssessmentInput::new(ProtectionDomain::Content),
                ThreatAssessment::degraded(),
                AgeGroup::Teen,
            );
            sample.recorded_at = sample.recorded_at + chrono::Duration::seconds(i);
            store.learn(&sample).unwrap();
        }
        assert_eq!(store.training_sample_count().unwrap(), 2);
        assert_eq!(store.training_samples().unwrap().len(), 2);
    }

    #[test]
    fn prune_and_since_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("s.db"), b"k").unwrap();
        let ev = event(0.8);
        store.insert_threat_event(&ev).unwrap();
        let ts = ev.ts.timestamp_millis();
        assert_eq!(store.threat_events_since(ts).unwrap().len(), 1);
        assert_eq!(store.threat_events_since(ts + 1).unwrap().len(), 0);
        assert_eq!(store.recent_threat_events(10).unwrap()[0].id, ev.id);
        assert_eq!(store.prune_before(ts + 1).unwrap(), 1);
        assert!(store.get_threat_event(&ev.id).unwrap().is_none());
    }
}
