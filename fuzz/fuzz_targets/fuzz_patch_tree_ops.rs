#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use patchkit_runtime::patch::teardown::fallible;
use patchkit_runtime::{PatchId, PatchManager, Scope};

#[derive(Arbitrary, Debug)]
enum TreeOp {
    Patch { node: u8, scope: Option<u8> },
    FailingTeardown { node: u8 },
    FailingSetup { node: u8 },
    NewChild { parent: u8 },
    DestroyScope { node: u8, scope: u8 },
    Destroy { node: u8 },
    Revert { patch: u8 },
}

const SCOPES: usize = 3;

fuzz_target!(|ops: Vec<TreeOp>| {
    let runs = Rc::new(RefCell::new(Vec::<u32>::new()));
    let scopes: Vec<Scope> = (0..SCOPES).map(|_| Scope::new("fuzz")).collect();
    let root = PatchManager::new();
    let mut nodes = vec![root.clone()];
    let mut applied: Vec<(u32, PatchId)> = Vec::new();
    let mut next = 0u32;

    for op in ops.into_iter().take(512) {
        match op {
            TreeOp::Patch { node, scope } => {
                let manager = &nodes[node as usize % nodes.len()];
                let runs = Rc::clone(&runs);
                let n = next;
                let undo = move || runs.borrow_mut().push(n);
                let id = match scope {
                    Some(s) => manager.patch_scoped(scopes[s as usize % SCOPES], move || undo),
                    None => manager.patch(move || undo),
                }
                .expect("no teardown in progress");
                applied.push((n, id));
                next += 1;
            }
            TreeOp::FailingTeardown { node } => {
                let manager = &nodes[node as usize % nodes.len()];
                let runs = Rc::clone(&runs);
                let n = next;
                let id = manager
                    .patch(move || {
                        fallible(move || {
                            runs.borrow_mut().push(n);
                            Err("asymmetric")
                        })
                    })
                    .expect("no teardown in progress");
                applied.push((n, id));
                next += 1;
            }
            TreeOp::FailingSetup { node } => {
                let manager = &nodes[node as usize % nodes.len()];
                let before = manager.len();
                let result = manager.try_patch(|| Err::<fn(), _>("rejected"));
                assert!(result.is_err());
                assert_eq!(manager.len(), before);
            }
            TreeOp::NewChild { parent } => {
                let parent = &nodes[parent as usize % nodes.len()];
                let child = parent.create_sub_manager().expect("no teardown in progress");
                nodes.push(child);
            }
            TreeOp::DestroyScope { node, scope } => {
                let manager = &nodes[node as usize % nodes.len()];
                let _ = manager.destroy_scope(scopes[scope as usize % SCOPES]);
            }
            TreeOp::Destroy { node } => {
                let manager = &nodes[node as usize % nodes.len()];
                let _ = manager.destroy();
                assert!(manager.is_empty());
            }
            TreeOp::Revert { patch } => {
                if !applied.is_empty() {
                    let (_, id) = applied[patch as usize % applied.len()];
                    let _ = root.revert(id);
                }
            }
        }
    }

    // Destroyed children are detached from their parent, so drain every
    // node, not just the root.
    for node in nodes.iter().rev() {
        let _ = node.destroy();
        assert!(node.is_empty());
    }

    // Every applied teardown ran exactly once, none that was not applied.
    let mut seen = runs.borrow().clone();
    seen.sort_unstable();
    let expected: Vec<u32> = (0..next).collect();
    assert_eq!(seen, expected);
});
