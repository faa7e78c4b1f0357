use super::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Lay down a job directory with a job.json and empty record files
fn make_job(project: &Path, name: &str, job_type: &str, parents: &[&str], outputs: &[(&str, &str, bool)]) {
    let dir = project.join(name);
    fs::create_dir_all(&dir).unwrap();
    let results: Vec<serde_json::Value> = outputs
        .iter()
        .map(|(group, file, passthrough)| {
            // touch the record file so existence checks pass
            fs::write(project.join(file), b"").unwrap();
            serde_json::json!({
                "group_name": group,
                "metafiles": [file],
                "passthrough": passthrough,
            })
        })
        .collect();
    let doc = serde_json::json!({
        "type": job_type,
        "parents": parents,
        "output_results": results,
    });
    fs::write(dir.join("job.json"), serde_json::to_vec(&doc).unwrap()).unwrap();
}

fn file_names(chain: &SourceChain) -> Vec<String> {
    chain
        .files()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_self_contained_job() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J2",
        "nonuniform_refine",
        &[],
        &[
            ("particles", "J2_particles.cs", false),
            ("particles", "J2_passthrough_particles.cs", true),
        ],
    );

    let resolved = resolve_job(&project.path().join("J2"), None).unwrap();
    assert_eq!(resolved.target, "J2");
    assert_eq!(resolved.chains.len(), 1);
    // passthrough first, primary last
    assert_eq!(
        file_names(&resolved.chains[0]),
        vec!["J2_passthrough_particles.cs", "J2_particles.cs"]
    );
}

#[test]
fn test_passthrough_pulled_from_parent() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J1",
        "extract_micrographs",
        &[],
        &[
            ("particles", "J1_particles.cs", false),
            ("particles", "J1_passthrough_particles.cs", true),
        ],
    );
    make_job(
        project.path(),
        "J2",
        "select_2D",
        &["J1"],
        &[("particles", "J2_particles.cs", false)],
    );

    let resolved = resolve_job(&project.path().join("J2"), None).unwrap();
    assert_eq!(resolved.chains.len(), 1);
    // the upstream passthrough comes first, then the target's primary;
    // the parent's own primary is not needed once the target has one
    assert_eq!(
        file_names(&resolved.chains[0]),
        vec!["J1_passthrough_particles.cs", "J2_particles.cs"]
    );
}

#[test]
fn test_excluded_outputs_skipped() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J3",
        "select_2D",
        &[],
        &[
            ("particles_rejected", "J3_particles_rejected.cs", false),
            ("particles", "J3_particles_selected.cs", false),
            ("particles", "J3_passthrough_particles.cs", true),
        ],
    );

    let resolved = resolve_job(&project.path().join("J3"), None).unwrap();
    assert_eq!(
        file_names(&resolved.chains[0]),
        vec!["J3_passthrough_particles.cs", "J3_particles_selected.cs"]
    );
}

#[test]
fn test_cycle_detected() {
    let project = tempfile::tempdir().unwrap();
    // no particle outputs anywhere, so resolution keeps walking parents
    make_job(project.path(), "J1", "curate", &["J2"], &[]);
    make_job(project.path(), "J2", "curate", &["J1"], &[]);

    let err = resolve_job(&project.path().join("J1"), None).unwrap_err();
    match err {
        JobTreeError::CyclicJobReference { cycle } => {
            assert_eq!(cycle.first().map(String::as_str), Some("J1"));
            assert_eq!(cycle.last().map(String::as_str), Some("J1"));
            assert!(cycle.len() >= 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_upstream_job() {
    let project = tempfile::tempdir().unwrap();
    make_job(project.path(), "J5", "select_2D", &["J404"], &[]);

    let err = resolve_job(&project.path().join("J5"), None).unwrap_err();
    match err {
        JobTreeError::MissingUpstreamJob { path } => {
            assert!(path.ends_with("J404"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_invalid_target_job() {
    let project = tempfile::tempdir().unwrap();
    fs::create_dir_all(project.path().join("empty")).unwrap();

    let err = resolve_job(&project.path().join("empty"), None).unwrap_err();
    assert!(matches!(err, JobTreeError::InvalidJobDirectory { .. }));
}

#[test]
fn test_no_particle_files() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J6",
        "import_movies",
        &[],
        &[("micrographs", "J6_micrographs.cs", false)],
    );

    let err = resolve_job(&project.path().join("J6"), None).unwrap_err();
    assert!(matches!(err, JobTreeError::NoParticleFiles { .. }));
}

#[test]
fn test_particle_sets_split_selection() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J7",
        "particle_sets",
        &[],
        &[
            ("split_0", "J7_split_0.cs", false),
            ("split_0", "J7_passthrough_split_0.cs", true),
            ("split_1", "J7_split_1.cs", false),
            ("split_1", "J7_passthrough_split_1.cs", true),
        ],
    );

    let all = resolve_job(&project.path().join("J7"), None).unwrap();
    assert_eq!(all.chains.len(), 2);
    assert_eq!(
        file_names(&all.chains[0]),
        vec!["J7_passthrough_split_0.cs", "J7_split_0.cs"]
    );

    let only_one: BTreeSet<u32> = [1].into_iter().collect();
    let selected = resolve_job(&project.path().join("J7"), Some(&only_one)).unwrap();
    assert_eq!(selected.chains.len(), 1);
    assert_eq!(
        file_names(&selected.chains[0]),
        vec!["J7_passthrough_split_1.cs", "J7_split_1.cs"]
    );
}

#[test]
fn test_hetero_refine_outputs() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J8",
        "hetero_refine",
        &[],
        &[
            ("particles_class_0", "J8_class_0.cs", false),
            ("particles_class_1", "J8_class_1.cs", false),
            ("particles_all_classes", "J8_passthrough.cs", true),
        ],
    );

    let resolved = resolve_job(&project.path().join("J8"), None).unwrap();
    assert_eq!(resolved.chains.len(), 1);
    // single chain: the all-classes passthrough is the base, every
    // class file patches its own subset
    assert_eq!(
        file_names(&resolved.chains[0]),
        vec!["J8_passthrough.cs", "J8_class_0.cs", "J8_class_1.cs"]
    );
}

#[test]
fn test_listed_but_missing_file_is_skipped() {
    let project = tempfile::tempdir().unwrap();
    make_job(
        project.path(),
        "J9",
        "select_2D",
        &[],
        &[
            ("particles", "J9_particles.cs", false),
            ("particles", "J9_passthrough.cs", true),
        ],
    );
    fs::remove_file(project.path().join("J9_passthrough.cs")).unwrap();

    let resolved = resolve_job(&project.path().join("J9"), None).unwrap();
    assert_eq!(file_names(&resolved.chains[0]), vec!["J9_particles.cs"]);
}
