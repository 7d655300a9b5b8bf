#![allow(dead_code)]

use elf_interpose::{Rebinder, Rebinding, SymbolLookup};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI32, AtomicUsize, Ordering},
    },
};

pub extern "C" fn replacement_a() {}
pub extern "C" fn replacement_b() {}

pub const ORIGINAL_MALLOC: usize = 0x1000;
pub const ORIGINAL_FREE: usize = 0x2000;

/// Rebinder that records every request and answers with a settable status.
#[derive(Default)]
pub struct RecordingRebinder {
    calls: Mutex<Vec<(String, usize)>>,
    status: AtomicI32,
}

impl RecordingRebinder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Rebinder for RecordingRebinder {
    fn rebind_symbols(&self, rebindings: &[Rebinding<'_>]) -> i32 {
        let mut calls = self.calls.lock().unwrap();
        for rebinding in rebindings {
            calls.push((
                rebinding.name.to_str().unwrap().to_owned(),
                rebinding.replacement as usize,
            ));
        }
        self.status.load(Ordering::SeqCst)
    }
}

/// Lookup over a fixed table that counts how often it is consulted.
pub struct TableLookup {
    table: HashMap<&'static str, usize>,
    hits: AtomicUsize,
}

impl TableLookup {
    pub fn new(entries: &[(&'static str, usize)]) -> Arc<Self> {
        Arc::new(TableLookup {
            table: entries.iter().copied().collect(),
            hits: AtomicUsize::new(0),
        })
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl SymbolLookup for TableLookup {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.table.get(name).map(|addr| *addr as *const ())
    }
}

pub fn malloc_free_lookup() -> Arc<TableLookup> {
    TableLookup::new(&[("malloc", ORIGINAL_MALLOC), ("free", ORIGINAL_FREE)])
}
