//! Scripted fetcher and fixtures shared by retrieval, retriever and API tests

use super::{RecordStore, RetrievalContext};
use crate::config::{ProgressConfig, StorageConfig};
use crate::error::FetchError;
use crate::fetcher::RecordFetcher;
use crate::types::{FetchTarget, HoldingsData, Identifier, InstitutionHoldings};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// MARCXML the scripted fetcher returns for `ocn`
pub(crate) fn sample_record(ocn: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<record xmlns="http://www.loc.gov/MARC21/slim">
  <leader>00000cam a2200000 i 4500</leader>
  <controlfield tag="001">ocm{ocn:0>8}</controlfield>
  <controlfield tag="003">OCoLC</controlfield>
  <datafield tag="245" ind1="1" ind2="0">
    <subfield code="a">Title {ocn}</subfield>
  </datafield>
  <datafield tag="650" ind1=" " ind2="0">
    <subfield code="a">Subject one</subfield>
  </datafield>
  <datafield tag="650" ind1=" " ind2="0">
    <subfield code="a">Subject two</subfield>
  </datafield>
</record>"#
    )
}

pub(crate) fn ids(raw: &[&str]) -> Vec<Identifier> {
    raw.iter().map(|r| Identifier::parse(r).unwrap()).collect()
}

pub(crate) fn numbered_ids(count: usize) -> Vec<Identifier> {
    (1..=count)
        .map(|n| Identifier::parse(&n.to_string()).unwrap())
        .collect()
}

/// Fetcher driven by per-identifier scripts
///
/// Unscripted identifiers succeed. `*_once` failures apply to the first request
/// only. Calls are logged in order.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    record_failures: HashMap<String, FetchError>,
    holdings_failures: HashMap<String, FetchError>,
    record_failures_once: Mutex<HashMap<String, FetchError>>,
    holdings_failures_once: Mutex<HashMap<String, FetchError>>,
    cancel_on_record_call: Option<(usize, CancellationToken)>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(FetchTarget, String)>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_record(mut self, ocn: &str, error: FetchError) -> Self {
        self.record_failures.insert(ocn.to_string(), error);
        self
    }

    pub(crate) fn fail_holdings(mut self, ocn: &str, error: FetchError) -> Self {
        self.holdings_failures.insert(ocn.to_string(), error);
        self
    }

    pub(crate) fn fail_record_once(mut self, ocn: &str, error: FetchError) -> Self {
        self.record_failures_once
            .get_mut()
            .unwrap()
            .insert(ocn.to_string(), error);
        self
    }

    pub(crate) fn fail_holdings_once(mut self, ocn: &str, error: FetchError) -> Self {
        self.holdings_failures_once
            .get_mut()
            .unwrap()
            .insert(ocn.to_string(), error);
        self
    }

    /// Cancel `token` while serving the `n`th record request (1-based)
    pub(crate) fn cancel_on_record_call(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_record_call = Some((n, token));
        self
    }

    /// Sleep before answering each record request
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(FetchTarget, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn record_calls(&self) -> Vec<String> {
        self.calls_for(FetchTarget::Record)
    }

    pub(crate) fn holdings_calls(&self) -> Vec<String> {
        self.calls_for(FetchTarget::Holdings)
    }

    fn calls_for(&self, target: FetchTarget) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, ocn)| ocn)
            .collect()
    }
}

#[async_trait]
impl RecordFetcher for ScriptedFetcher {
    async fn fetch_record(&self, id: &Identifier) -> Result<String, FetchError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((FetchTarget::Record, id.to_string()));
            calls.iter().filter(|(t, _)| *t == FetchTarget::Record).count()
        };
        if let Some((at, token)) = &self.cancel_on_record_call {
            if *at == n {
                token.cancel();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.record_failures_once.lock().unwrap().remove(id.as_str()) {
            return Err(e);
        }
        match self.record_failures.get(id.as_str()) {
            Some(e) => Err(e.clone()),
            None => Ok(sample_record(id.as_str())),
        }
    }

    async fn fetch_holdings(
        &self,
        id: &Identifier,
        symbols: &[String],
    ) -> Result<HoldingsData, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((FetchTarget::Holdings, id.to_string()));
        if let Some(e) = self.holdings_failures_once.lock().unwrap().remove(id.as_str()) {
            return Err(e);
        }
        if let Some(e) = self.holdings_failures.get(id.as_str()) {
            return Err(e.clone());
        }
        Ok(HoldingsData {
            ocn: id.to_string(),
            holdings: symbols
                .iter()
                .enumerate()
                .map(|(i, symbol)| InstitutionHoldings {
                    institution_symbol: symbol.clone(),
                    total_holding_count: i as u64 + 1,
                    total_shared_print_count: 0,
                    total_editions: 2,
                })
                .collect(),
        })
    }
}

pub(crate) fn storage_in(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        records_dir: dir.path().join("records"),
        holdings_dir: dir.path().join("holdings"),
    }
}

/// Context over a temp dir, with a small symbol list and no throttling
pub(crate) fn test_context(
    dir: &TempDir,
    fetcher: Arc<dyn RecordFetcher>,
) -> (RetrievalContext, broadcast::Receiver<crate::types::Event>) {
    let (event_tx, event_rx) = broadcast::channel(1024);
    let ctx = RetrievalContext {
        fetcher,
        store: RecordStore::new(&storage_in(dir)),
        holdings_symbols: vec!["QGE".to_string(), "VU@".to_string()],
        progress: ProgressConfig {
            min_interval: Duration::ZERO,
            ..ProgressConfig::default()
        },
        event_tx,
        cancel: CancellationToken::new(),
    };
    (ctx, event_rx)
}
