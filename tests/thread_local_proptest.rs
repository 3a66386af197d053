use proptest::prelude::*;
use std::cell::RefCell;
use thread_slot::{Deallocator, ThreadLocal};

thread_local! {
    static DISPOSED: RefCell<Vec<u16>> = const { RefCell::new(Vec::new()) };
}

fn record(v: u16) {
    DISPOSED.with(|d| d.borrow_mut().push(v));
}

fn take_disposed() -> Vec<u16> {
    DISPOSED.with(|d| std::mem::take(&mut *d.borrow_mut()))
}

#[derive(Debug, Clone)]
enum Operation {
    Set(u16),
    Clear,
    Get,
    GetOrInit(u16),
}

proptest! {
    #[test]
    fn test_cell_matches_option_model(ops in proptest::collection::vec(
        prop_oneof![
            any::<u16>().prop_map(Operation::Set),
            Just(Operation::Clear),
            Just(Operation::Get),
            any::<u16>().prop_map(Operation::GetOrInit),
        ],
        1..64
    )) {
        take_disposed();
        let cell = ThreadLocal::new(Deallocator::custom(record)).unwrap();
        let mut model: Option<u16> = None;
        let mut expected_disposed = Vec::new();

        for op in ops {
            match op {
                Operation::Set(v) => {
                    cell.set(Some(v));
                    expected_disposed.extend(model.replace(v));
                }
                Operation::Clear => {
                    cell.clear();
                    expected_disposed.extend(model.take());
                }
                Operation::Get => {
                    prop_assert_eq!(cell.get(), model);
                }
                Operation::GetOrInit(v) => {
                    let mut ran = false;
                    let got = cell.get_or_init(|| {
                        ran = true;
                        v
                    });
                    prop_assert_eq!(ran, model.is_none(), "default ran on an occupied slot");
                    let want = *model.get_or_insert(v);
                    prop_assert_eq!(got, want);
                }
            }
            prop_assert_eq!(cell.is_set(), model.is_some());
            prop_assert_eq!(&take_disposed(), &expected_disposed);
            expected_disposed.clear();
        }

        drop(cell);
        prop_assert_eq!(take_disposed(), model.into_iter().collect::<Vec<_>>());
    }
}
