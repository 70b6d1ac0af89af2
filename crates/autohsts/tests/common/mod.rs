//! Shared fixtures for the AutoHSTS integration tests

#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use autohsts::{
    AutoHsts, Clock, FileModuleRegistry, HostId, KdlVhostTree, Lineage, MemoryProgressStore,
    ProgressMap, ProgressRecord, ProgressStore, StepSchedule, StoreError,
};

/// Key shared by the hosts of the `ocspvhost.com` lineage
pub const KEY_PATH: &str = "/etc/apache2/ssl/key-certbot_15.pem";

pub const VHOSTS: &str = r#"
vhost "ocspvhost.com" {
    server-name "ocspvhost.com"
    ssl-engine "on"
    ssl-certificate-file "/etc/apache2/ssl/cert-certbot_15.pem"
    ssl-certificate-key-file "/etc/apache2/ssl/key-certbot_15.pem"
}

vhost "encryption-example.demo" {
    server-name "encryption-example.demo"
    ssl-certificate-file "/etc/letsencrypt/live/encryption-example.demo/cert.pem"
    ssl-certificate-key-file "/etc/letsencrypt/live/encryption-example.demo/privkey.pem"
}

vhost "plain.example" {
    server-name "plain.example"
    document-root "/var/www/plain"
}

vhost "dup.example" {
    server-name "dup.example"
}

vhost "dup.example" {
    server-name "www.dup.example"
}

vhost "subdomains.example" {
    server-name "subdomains.example"
    ssl-certificate-key-file "/etc/apache2/ssl/key-certbot_15.pem"
    header "always" "set" "Strict-Transport-Security" "max-age=60; includeSubDomains"
}

vhost "twice.example" {
    server-name "twice.example"
    ssl-certificate-key-file "/etc/apache2/ssl/key-certbot_15.pem"
    header "always" "set" "Strict-Transport-Security" "max-age=60"
    header "always" "set" "Strict-Transport-Security" "max-age=60"
}

vhost "broken.example" {
    server-name "broken.example"
    ssl-certificate-key-file "/etc/apache2/ssl/key-certbot_15.pem"
    header "always" "set" "Strict-Transport-Security" "includeSubDomains"
}
"#;

pub type TestManager = AutoHsts<KdlVhostTree, FileModuleRegistry, RecordingStore, CountingClock>;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn host(id: &str) -> HostId {
    HostId::new(id)
}

pub fn lineage() -> Lineage {
    Lineage::new("ocspvhost.com", KEY_PATH)
}

/// Manual clock that counts how often it is read
#[derive(Debug)]
pub struct CountingClock {
    now: Cell<DateTime<Utc>>,
    reads: Cell<usize>,
}

impl CountingClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
            reads: Cell::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap();
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for CountingClock {
    fn now(&self) -> DateTime<Utc> {
        self.reads.set(self.reads.get() + 1);
        self.now.get()
    }
}

/// In-memory store that counts mutating calls
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryProgressStore,
    pub puts: usize,
    pub deletes: usize,
    pub commits: usize,
    pub reloads: usize,
    fail_next_commit: Cell<bool>,
}

impl RecordingStore {
    pub fn with_records(records: impl IntoIterator<Item = ProgressRecord>) -> Self {
        Self {
            inner: MemoryProgressStore::with_records(records),
            ..Self::default()
        }
    }

    pub fn committed(&self) -> &ProgressMap {
        self.inner.committed()
    }

    /// Number of calls that change or persist content
    pub fn writes(&self) -> usize {
        self.puts + self.deletes + self.commits
    }

    /// Make the next commit fail as if the disk were full
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.set(true);
    }
}

impl ProgressStore for RecordingStore {
    fn fetch_all(&self) -> Result<ProgressMap, StoreError> {
        self.inner.fetch_all()
    }

    fn put(&mut self, host: &HostId, record: ProgressRecord) -> Result<(), StoreError> {
        self.puts += 1;
        self.inner.put(host, record)
    }

    fn delete(&mut self, host: &HostId) -> Result<(), StoreError> {
        self.deletes += 1;
        self.inner.delete(host)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commits += 1;
        if self.fail_next_commit.replace(false) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.commit()
    }

    fn reload(&mut self) -> Result<(), StoreError> {
        self.reloads += 1;
        self.inner.reload()
    }
}

/// Manager over the fixture tree with only the TLS module active
pub fn manager_with(
    schedule: StepSchedule,
    frequency: Duration,
    store: RecordingStore,
) -> TestManager {
    let tree = KdlVhostTree::parse(VHOSTS).unwrap();
    let modules = FileModuleRegistry::in_memory(["ssl_module"]);

    AutoHsts::new(tree, modules, store, schedule)
        .with_frequency(frequency)
        .with_clock(CountingClock::new(start_time()))
}

pub fn manager(frequency: Duration) -> TestManager {
    manager_with(StepSchedule::default(), frequency, RecordingStore::default())
}

/// Record as stored right after activation at `start_time`
pub fn fresh_record(id: &str) -> ProgressRecord {
    ProgressRecord::new(host(id), start_time())
}
