//! End-to-end pipeline tests against an in-process fake engine.
//!
//! No ssh-keygen required: [`common::FakeEngine`] stands in for both
//! generation and screening, so these always run.

mod common;

use std::fs;

use common::{entries, size_field, workspace, FakeEngine, RECORDS_PER_RUN};
use moduli_assembly::artifact::{self, ArtifactKind};
use moduli_assembly::assemble::HEADER_MARKER;
use moduli_assembly::{ConfigError, ModuliAssembly, ModuliError, ProtectedPaths};
use rand::rngs::StdRng;
use rand::SeedableRng;

const ENABLED: &[u32] = &[2048, 3072, 4096];

// ── Batch ───────────────────────────────────────────────────────

#[test]
fn batch_groups_repeats_and_assembles_ascending() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);
    let mut rng = StdRng::seed_from_u64(42);

    let report = assembly
        .run_batch_with_rng(&[3072, 4096, 3072], &mut rng)
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.plan.into_iter().collect::<Vec<_>>(), vec![(3072, 2), (4096, 1)]);
    assert_eq!(engine.generate_calls(), vec![3072, 3072, 4096]);
    assert_eq!(engine.screen_calls().len(), 2);
    assert_eq!(report.screened.len(), 2);

    let moduli_dir = assembly.workspace().moduli_dir();
    let screened = artifact::scan_kind(&moduli_dir, ArtifactKind::Screened).unwrap();
    assert_eq!(screened.iter().map(|a| a.bits()).collect::<Vec<_>>(), vec![3072, 4096]);
    assert!(artifact::scan_kind(&moduli_dir, ArtifactKind::Candidate)
        .unwrap()
        .is_empty());

    let written = report.assembly.unwrap();
    let content = fs::read_to_string(assembly.workspace().moduli_file()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with(HEADER_MARKER));
    let sizes: Vec<u32> = lines[1..].iter().map(|l| size_field(l)).collect();
    assert_eq!(sizes.len(), RECORDS_PER_RUN * 3);
    assert!(sizes[..RECORDS_PER_RUN * 2].iter().all(|&s| s == 3071));
    assert!(sizes[RECORDS_PER_RUN * 2..].iter().all(|&s| s == 4095));
    assert_eq!(written.total_records(), RECORDS_PER_RUN * 3);

    let log = fs::read_to_string(assembly.workspace().screened_log()).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().all(|l| l.starts_with("Screened File: ")));
}

#[test]
fn batch_rejects_disabled_bits_before_spawning() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);

    let err = assembly.run_batch(&[3072, 8192]).unwrap_err();

    assert!(matches!(
        err,
        ModuliError::Config(ConfigError::BitsizeNotEnabled { bits: 8192, .. })
    ));
    assert!(engine.calls().is_empty());
    assert!(entries(&assembly.workspace().moduli_dir()).is_empty());
}

#[test]
fn batch_continues_past_a_failed_screen() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine {
        fail_screen: vec![2048],
        ..FakeEngine::new()
    };
    let assembly = ModuliAssembly::new(ws, &engine);

    let report = assembly.run_batch(&[2048, 4096]).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].bits(), Some(2048));
    let written = report.assembly.expect("assembly still runs");
    assert_eq!(written.records.keys().copied().collect::<Vec<_>>(), vec![4096]);

    let moduli_dir = assembly.workspace().moduli_dir();
    let left = artifact::scan_kind(&moduli_dir, ArtifactKind::Candidate).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].bits(), 2048);
    assert!(left[0].checkpoint_path().exists());
}

#[test]
fn batch_keeps_going_when_listing_log_is_unwritable() {
    let (_root, ws) = workspace(ENABLED);
    fs::create_dir(ws.screened_log()).unwrap();
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);

    let report = assembly.run_batch(&[2048, 4096]).unwrap();

    assert_eq!(engine.screen_calls().len(), 2);
    assert_eq!(report.screened.len(), 2);
    assert!(report.assembly.is_some());
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|e| matches!(e, ModuliError::Io { action: "open", .. })));

    let moduli_dir = assembly.workspace().moduli_dir();
    assert!(artifact::scan_kind(&moduli_dir, ArtifactKind::Candidate)
        .unwrap()
        .is_empty());
    assert!(assembly.workspace().moduli_file().exists());
}

#[test]
fn batch_records_generation_failure() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine {
        fail_generate: vec![3072],
        ..FakeEngine::new()
    };
    let assembly = ModuliAssembly::new(ws, &engine);

    let report = assembly.run_batch(&[2048, 3072]).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], ModuliError::Generate { bits: 3072, .. }));
    assert_eq!(report.screened.len(), 1);
}

// ── Restart ─────────────────────────────────────────────────────

#[test]
fn restart_resumes_with_checkpoint_and_is_idempotent() {
    let (_root, ws) = workspace(ENABLED);
    let failing = FakeEngine {
        fail_screen: vec![4096],
        ..FakeEngine::new()
    };
    let first = ModuliAssembly::new(ws.clone(), &failing);
    let candidate = first.generate_candidates(4096, 2).unwrap();
    assert!(first.screen_candidates(&candidate).is_err());
    assert!(candidate.exists());

    let engine = FakeEngine::new();
    let second = ModuliAssembly::new(ws, &engine);
    let report = second.restart_candidate_screening().unwrap();

    assert!(report.is_success());
    assert_eq!(report.screened.len(), 1);
    match &engine.calls()[0] {
        common::Call::Screen {
            candidates,
            checkpoint,
            generator,
        } => {
            assert_eq!(candidates, &candidate);
            assert_eq!(
                checkpoint.file_name().unwrap().to_str().unwrap(),
                artifact::checkpoint_name(candidate.file_name().unwrap().to_str().unwrap())
            );
            assert_eq!(*generator, 2);
        }
        other => panic!("expected Screen call, got {:?}", other),
    }
    assert!(!candidate.exists());
    assert!(!checkpoint_of(&candidate).exists());

    let again = second.restart_candidate_screening().unwrap();
    assert_eq!(again.attempted(), 0);
}

fn checkpoint_of(candidate: &std::path::Path) -> std::path::PathBuf {
    artifact::Artifact::from_path(candidate)
        .unwrap()
        .checkpoint_path()
}

// ── Assembly ────────────────────────────────────────────────────

#[test]
fn assembly_preserves_every_screened_record() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);
    for bits in [4096, 2048, 2048, 3072] {
        let candidate = assembly.generate_candidates(bits, 1).unwrap();
        assembly.screen_candidates(&candidate).unwrap();
    }

    let moduli_dir = assembly.workspace().moduli_dir();
    let mut expected: Vec<String> = artifact::scan_kind(&moduli_dir, ArtifactKind::Screened)
        .unwrap()
        .iter()
        .flat_map(|a| {
            fs::read_to_string(&a.path)
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect();

    let written = assembly.create_moduli_file(None).unwrap();
    let content = fs::read_to_string(&written.path).unwrap();
    let mut got: Vec<String> = content.lines().skip(1).map(str::to_owned).collect();

    assert_eq!(got.len(), expected.len());
    got.sort();
    expected.sort();
    assert_eq!(got, expected);
    assert_eq!(written.records.get(&2048), Some(&(RECORDS_PER_RUN * 2)));
}

#[test]
fn explicit_target_is_used_for_snapshot_and_link() {
    let (root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);
    let target = root.path().join("moduli.out");

    let written = assembly.create_moduli_file(Some(&target)).unwrap();

    assert_eq!(written.link, target);
    assert_eq!(fs::read_link(&target).unwrap(), written.path);
    let snapshot = written.path.file_name().unwrap().to_str().unwrap();
    assert!(snapshot.starts_with("moduli.out_"), "{}", snapshot);
}

// ── Clear ───────────────────────────────────────────────────────

#[test]
fn clear_removes_all_artifacts_and_keeps_directory() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine {
        fail_screen: vec![3072],
        ..FakeEngine::new()
    };
    let assembly = ModuliAssembly::new(ws, &engine);
    assembly.run_batch(&[2048, 3072]).unwrap();
    let moduli_dir = assembly.workspace().moduli_dir();
    let before = entries(&moduli_dir).len();
    // screened, candidate, checkpoint, listing log
    assert_eq!(before, 4);

    assert_eq!(assembly.clear_artifacts().unwrap(), before);
    assert!(moduli_dir.is_dir());
    assert!(entries(&moduli_dir).is_empty());
}

#[test]
fn clear_refuses_protected_moduli_dir() {
    let (_root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let moduli_dir = ws.moduli_dir();
    fs::write(moduli_dir.join("3072.screened_x"), "keep").unwrap();
    let assembly =
        ModuliAssembly::new(ws, &engine).with_protected(ProtectedPaths::none().with(&moduli_dir));

    assert!(matches!(
        assembly.clear_artifacts(),
        Err(ModuliError::ProtectedPath(_))
    ));
    assert_eq!(entries(&moduli_dir), vec!["3072.screened_x"]);
}

#[test]
fn remove_config_deletes_everything() {
    let (root, ws) = workspace(ENABLED);
    let engine = FakeEngine::new();
    let assembly = ModuliAssembly::new(ws, &engine);
    assembly.run_batch(&[2048]).unwrap();

    assert!(assembly.remove_config().unwrap());
    assert!(!assembly.workspace().config_dir().exists());
    assert!(root.path().is_dir());
}
