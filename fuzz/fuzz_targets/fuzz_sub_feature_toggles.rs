#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use patchkit_core::Observable;
use patchkit_runtime::{BoxError, ExtensionFeature, PatchManager};

#[derive(Arbitrary, Debug)]
enum ToggleOp {
    Set { setting: u8, value: bool },
    FailNextBuild { setting: u8 },
}

const SETTINGS: usize = 4;

fuzz_target!(|ops: Vec<ToggleOp>| {
    let settings: Vec<Observable<bool>> = (0..SETTINGS).map(|_| Observable::new(false)).collect();
    let fail_next: Vec<Rc<Cell<bool>>> = (0..SETTINGS).map(|_| Rc::new(Cell::new(false))).collect();
    let live = Rc::new(Cell::new(0i64));
    let root = ExtensionFeature::new(PatchManager::new());

    for (i, setting) in settings.iter().enumerate() {
        let live = Rc::clone(&live);
        let fail = Rc::clone(&fail_next[i]);
        root.add_sub_feature(
            format!("feature-{i}"),
            move |manager: PatchManager| -> Result<(), BoxError> {
                let live = Rc::clone(&live);
                manager.patch(move || {
                    live.set(live.get() + 1);
                    move || live.set(live.get() - 1)
                })?;
                if fail.replace(false) {
                    return Err("build failed".into());
                }
                Ok(())
            },
            setting,
        )
        .expect("unique names, initially disabled");
    }

    for op in ops.into_iter().take(512) {
        match op {
            ToggleOp::Set { setting, value } => {
                settings[setting as usize % SETTINGS].set(value);
            }
            ToggleOp::FailNextBuild { setting } => {
                fail_next[setting as usize % SETTINGS].set(true);
            }
        }
        let active = (0..SETTINGS)
            .filter(|i| root.is_active(&format!("feature-{i}")))
            .count();
        assert_eq!(live.get(), active as i64);
    }

    root.destroy().expect("infallible teardowns");
    assert_eq!(live.get(), 0);
    assert!(root.manager().is_empty());
});
