mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{mock_vm, top_level, TestHost, OUTPUT_RELEASES};
use zvmc_bridge::{ExecutionOutput, Revision, StatusCode};

// Kept as the only test in this binary: it asserts on a process-wide counter.
#[test]
fn every_native_result_is_released_exactly_once() {
    let vm = mock_vm(Arc::new(AtomicUsize::new(0)));
    let mut host = TestHost::replying(ExecutionOutput::default());
    let before = OUTPUT_RELEASES.load(Ordering::SeqCst);

    let cases = [
        (&b"T"[..], StatusCode::SUCCESS, 8),
        (b"TR", StatusCode::REVERT, 8),
        (b"TF", StatusCode::FAILURE, 8),
        (b"R", StatusCode::REVERT, 0),
    ];
    for (code, status, len) in cases {
        let out = vm.execute(&mut host, Revision::default(), &top_level(1), code);
        assert_eq!(out.status_code(), status);
        assert_eq!(out.output.len(), len);
    }

    // Empty outputs carry no release hook.
    assert_eq!(OUTPUT_RELEASES.load(Ordering::SeqCst) - before, 3);
}
