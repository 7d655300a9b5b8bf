mod common;

use common::{
    ORIGINAL_FREE, ORIGINAL_MALLOC, RecordingRebinder, TableLookup, malloc_free_lookup,
    replacement_a, replacement_b,
};
use elf_interpose::{
    DuplicateNames, Error, HookState, Interposer, Interposition, REBIND_UNSUPPORTED, RebindStatus,
    UnsupportedRebinder,
};
use std::sync::Arc;

fn scripted() -> (Interposer, Arc<TableLookup>, Arc<RecordingRebinder>) {
    let lookup = malloc_free_lookup();
    let rebinder = RecordingRebinder::new();
    let interposer = Interposer::builder()
        .lookup(lookup.clone())
        .rebinder(rebinder.clone())
        .build();
    (interposer, lookup, rebinder)
}

#[test]
fn create_resolves_and_registers() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    assert_eq!(record.state(), HookState::Unhooked);
    assert_eq!(
        interposer.original_pointer(&record).unwrap().as_ptr() as usize,
        ORIGINAL_MALLOC
    );
    assert_eq!(interposer.function_name(&record), "malloc");
    assert!(interposer.contains(&record));
    assert!(record.last_status().is_none());
    assert_eq!(rebinder.call_count(), 0);
}

#[test]
fn create_unknown_symbol_stays_unresolved() {
    let (interposer, _, _) = scripted();
    let record = interposer
        .create("no_such_symbol", replacement_a as *const ())
        .unwrap();
    assert_eq!(record.state(), HookState::Unresolved);
    assert!(interposer.original_pointer(&record).is_none());
    assert_eq!(interposer.len(), 1);
}

#[test]
fn create_rejects_empty_name() {
    let (interposer, _, _) = scripted();
    assert!(matches!(
        interposer.create("", replacement_a as *const ()),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(interposer.is_empty());
}

#[test]
fn resolution_is_cached() {
    let (interposer, lookup, _) = scripted();
    let record = interposer.create("free", replacement_a as *const ()).unwrap();
    let hits = lookup.hits();
    assert!(interposer.ensure_resolved(&record));
    assert!(interposer.ensure_resolved(&record));
    interposer.hook(&record).unwrap();
    assert_eq!(
        interposer.original_pointer_by_name("free").unwrap().as_ptr() as usize,
        ORIGINAL_FREE
    );
    assert_eq!(lookup.hits(), hits);
}

#[test]
fn hook_then_unhook() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();

    interposer.hook(&record).unwrap();
    assert!(record.is_hooked());
    assert_eq!(record.last_status(), Some(RebindStatus::Success));
    // the original stays reachable while hooked
    assert_eq!(
        interposer.original_pointer(&record).unwrap().as_ptr() as usize,
        ORIGINAL_MALLOC
    );

    interposer.unhook(&record).unwrap();
    assert_eq!(record.state(), HookState::Unhooked);
    assert_eq!(
        rebinder.calls(),
        [
            ("malloc".to_owned(), replacement_a as usize),
            ("malloc".to_owned(), ORIGINAL_MALLOC),
        ]
    );
}

#[test]
fn hook_and_unhook_are_idempotent() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();

    interposer.unhook(&record).unwrap();
    assert_eq!(rebinder.call_count(), 0);

    interposer.hook(&record).unwrap();
    interposer.hook(&record).unwrap();
    assert_eq!(rebinder.call_count(), 1);

    interposer.unhook(&record).unwrap();
    interposer.unhook(&record).unwrap();
    assert_eq!(rebinder.call_count(), 2);
}

#[test]
fn hook_unresolved_fails_without_calling_facility() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer
        .create("no_such_symbol", replacement_a as *const ())
        .unwrap();
    let err = interposer.hook(&record).unwrap_err();
    assert!(matches!(err, Error::SymbolNotFound { .. }));
    assert_eq!(err.status(), Some(RebindStatus::MissingOriginal));
    assert_eq!(record.last_status(), Some(RebindStatus::MissingOriginal));
    assert!(matches!(
        interposer.unhook(&record),
        Err(Error::SymbolNotFound { .. })
    ));
    assert_eq!(record.state(), HookState::Unresolved);
    assert_eq!(rebinder.call_count(), 0);
}

#[test]
fn hook_without_replacement_fails() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer.create("malloc", core::ptr::null()).unwrap();
    assert!(matches!(
        interposer.hook(&record),
        Err(Error::MissingReplacement { .. })
    ));
    assert_eq!(record.last_status(), Some(RebindStatus::MissingReplacement));
    assert_eq!(record.state(), HookState::Unhooked);
    // never hooked, so unhooking has nothing to do
    interposer.unhook(&record).unwrap();
    assert_eq!(rebinder.call_count(), 0);
}

#[test]
fn facility_failure_keeps_state() {
    let (interposer, _, rebinder) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();

    rebinder.fail_with(7);
    let err = interposer.hook(&record).unwrap_err();
    assert!(matches!(err, Error::Rebind { status: 7, .. }));
    assert_eq!(record.state(), HookState::Unhooked);
    assert_eq!(
        record.last_status().and_then(|s| s.facility_code()),
        Some(7)
    );

    rebinder.fail_with(0);
    interposer.hook(&record).unwrap();

    rebinder.fail_with(-3);
    assert!(interposer.unhook(&record).is_err());
    assert!(record.is_hooked());

    rebinder.fail_with(0);
    interposer.unhook(&record).unwrap();
    assert!(!record.is_hooked());
}

#[test]
fn unsupported_facility_reports_status() {
    let interposer = Interposer::builder()
        .lookup(malloc_free_lookup())
        .rebinder(UnsupportedRebinder)
        .build();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    assert!(matches!(
        interposer.hook(&record),
        Err(Error::Rebind { status: REBIND_UNSUPPORTED, .. })
    ));
    assert_eq!(
        record.last_status().and_then(|s| s.facility_code()),
        Some(REBIND_UNSUPPORTED)
    );
}

#[test]
fn rebinding_pairs() {
    let (interposer, _, _) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let hook = interposer.replacement_rebinding(&record);
    assert_eq!(hook.name, c"malloc");
    assert_eq!(hook.replacement as usize, replacement_a as usize);
    let unhook = interposer.original_rebinding(&record);
    assert_eq!(unhook.name, c"malloc");
    assert_eq!(unhook.replacement as usize, ORIGINAL_MALLOC);

    let unresolved = interposer
        .create("no_such_symbol", replacement_a as *const ())
        .unwrap();
    assert!(interposer.original_rebinding(&unresolved).replacement.is_null());
}

#[test]
fn original_pointer_by_name_prefers_first_registered() {
    let lookup = TableLookup::new(&[("malloc", ORIGINAL_MALLOC)]);
    let interposer = Interposer::builder()
        .lookup(lookup)
        .rebinder(RecordingRebinder::new())
        .build();
    let first = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let second = interposer
        .create("malloc", replacement_b as *const ())
        .unwrap();
    assert_eq!(interposer.find_by_name("malloc").unwrap().id(), first.id());
    assert!(interposer.original_pointer_by_name("malloc").is_some());
    assert!(interposer.original_pointer_by_name("free").is_none());
    assert!(interposer.original_pointer_by_name("").is_none());

    assert!(interposer.destroy(&first));
    assert_eq!(interposer.find_by_name("malloc").unwrap().id(), second.id());
}

#[test]
fn reject_duplicates_leaves_registry_unchanged() {
    let interposer = Interposer::builder()
        .lookup(malloc_free_lookup())
        .rebinder(RecordingRebinder::new())
        .duplicate_names(DuplicateNames::Reject)
        .build();
    interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    assert!(matches!(
        interposer.create("malloc", replacement_b as *const ()),
        Err(Error::DuplicateName { .. })
    ));
    assert_eq!(interposer.len(), 1);
}

#[test]
fn destroy_unregisters_once() {
    let (interposer, _, _) = scripted();
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    assert!(interposer.destroy(&record));
    assert!(!interposer.destroy(&record));
    assert!(interposer.original_pointer_by_name("malloc").is_none());
    // the handle is still usable
    assert_eq!(record.name(), "malloc");
}

#[test]
fn register_static_record() {
    let (interposer, _, _) = scripted();
    let record = Arc::new(Interposition::new("free", replacement_a as *const ()).unwrap());
    assert_eq!(record.state(), HookState::Unresolved);
    assert!(interposer.register(record.clone()).unwrap());
    assert!(!interposer.register(record.clone()).unwrap());
    assert_eq!(record.state(), HookState::Unhooked);
    assert_eq!(interposer.len(), 1);
}

#[test]
fn bulk_sweep_attempts_everything() {
    let (interposer, _, rebinder) = scripted();
    let malloc = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let missing = interposer
        .create("no_such_symbol", replacement_a as *const ())
        .unwrap();
    let free = interposer.create("free", replacement_b as *const ()).unwrap();

    let outcome = interposer.hook_registered();
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0.id(), missing.id());
    assert!(!outcome.is_ok());
    assert!(malloc.is_hooked() && free.is_hooked());

    let outcome = interposer.unhook_all(&[malloc.clone(), free.clone()]);
    assert!(outcome.is_ok());
    assert_eq!(outcome.succeeded, 2);
    assert!(!malloc.is_hooked() && !free.is_hooked());

    let names: Vec<_> = rebinder.calls().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["malloc", "free", "malloc", "free"]);
}

#[test]
fn concurrent_hooks_call_facility_once() {
    let (interposer, _, rebinder) = scripted();
    let interposer = Arc::new(interposer);
    let record = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let interposer = interposer.clone();
            let record = record.clone();
            std::thread::spawn(move || interposer.hook(&record).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(record.is_hooked());
    assert_eq!(rebinder.call_count(), 1);
}

#[test]
fn last_hook_wins_for_shared_name() {
    let (interposer, _, rebinder) = scripted();
    let first = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let second = interposer
        .create("malloc", replacement_b as *const ())
        .unwrap();

    interposer.hook(&first).unwrap();
    interposer.hook(&second).unwrap();
    assert_eq!(first.state(), HookState::Unhooked);
    assert!(second.is_hooked());

    // displaced, so there is nothing to undo
    interposer.unhook(&first).unwrap();
    assert_eq!(rebinder.call_count(), 2);

    interposer.unhook(&second).unwrap();
    assert!(!first.is_hooked() && !second.is_hooked());

    interposer.hook(&first).unwrap();
    assert!(first.is_hooked());
    assert_eq!(
        rebinder.calls(),
        [
            ("malloc".to_owned(), replacement_a as usize),
            ("malloc".to_owned(), replacement_b as usize),
            ("malloc".to_owned(), ORIGINAL_MALLOC),
            ("malloc".to_owned(), replacement_a as usize),
        ]
    );
}

#[test]
fn failed_hook_keeps_current_binding() {
    let (interposer, _, rebinder) = scripted();
    let first = interposer
        .create("malloc", replacement_a as *const ())
        .unwrap();
    let second = interposer
        .create("malloc", replacement_b as *const ())
        .unwrap();
    interposer.hook(&first).unwrap();

    rebinder.fail_with(5);
    assert!(interposer.hook(&second).is_err());
    assert!(first.is_hooked());
    assert!(!second.is_hooked());
}
