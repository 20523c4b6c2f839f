//! Integration test: matrix and sample class loading from delimited files

use exseek::utils::DatasetLoader;
use exseek::ExseekError;
use std::path::{Path, PathBuf};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let matrix = write(
        dir,
        "matrix.txt",
        "sample\tgene_a\tgene_b\tgene_c\n\
         s1\t1.0\t2.0\t3.0\n\
         s2\t4.0\t5.0\t6.0\n\
         s3\t7.0\t\t9.0\n\
         s4\t10.0\t11.0\t12.0\n\
         s5\t13.0\t14.0\t15.0\n",
    );
    let classes = write(
        dir,
        "classes.txt",
        "sample_id\tlabel\n\
         s1\tnormal\n\
         s2\ttumor\n\
         s3\ttumor\n\
         s4\tnormal\n\
         s5\tadjacent\n",
    );
    (matrix, classes)
}

#[test]
fn test_load_with_explicit_classes() {
    let dir = tempfile::tempdir().unwrap();
    let (matrix, classes) = fixture(dir.path());

    let dataset = DatasetLoader::new()
        .with_classes(vec!["tumor".into()], vec!["normal".into(), "adjacent".into()])
        .load(&matrix, &classes)
        .unwrap();

    assert_eq!(dataset.n_samples(), 5);
    assert_eq!(dataset.n_features(), 3);
    assert_eq!(dataset.feature_names, vec!["gene_a", "gene_b", "gene_c"]);
    assert_eq!(dataset.sample_ids, vec!["s1", "s2", "s3", "s4", "s5"]);
    assert_eq!(dataset.y.to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(dataset.n_positive(), 2);
    // the empty cell is kept as NaN
    assert!(dataset.has_nan());
    assert!(dataset.x[[2, 1]].is_nan());
    assert_eq!(dataset.x[[3, 2]], 12.0);
}

#[test]
fn test_samples_outside_both_classes_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (matrix, classes) = fixture(dir.path());

    let dataset = DatasetLoader::new()
        .with_classes(vec!["tumor".into()], vec!["normal".into()])
        .load(&matrix, &classes)
        .unwrap();
    assert_eq!(dataset.sample_ids, vec!["s1", "s2", "s3", "s4"]);
    assert_eq!(dataset.x.nrows(), 4);
}

#[test]
fn test_inferred_classes_require_exactly_two() {
    let dir = tempfile::tempdir().unwrap();
    let (matrix, classes) = fixture(dir.path());

    let err = DatasetLoader::new().load(&matrix, &classes).unwrap_err();
    assert!(matches!(err, ExseekError::DataError(_)));
    assert!(err.to_string().contains("expect 2 classes but 3 classes found"));
}

#[test]
fn test_two_inferred_classes_take_the_first_name_as_positive() {
    let dir = tempfile::tempdir().unwrap();
    let (matrix, _) = fixture(dir.path());
    let classes = write(
        dir.path(),
        "two_classes.txt",
        "sample_id\tlabel\ns1\tb\ns2\ta\ns3\ta\ns4\tb\ns5\tb\n",
    );

    let dataset = DatasetLoader::new().load(&matrix, &classes).unwrap();
    assert_eq!(dataset.positive_class, vec!["a"]);
    assert_eq!(dataset.negative_class, vec!["b"]);
    assert_eq!(dataset.y.to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_comma_separated_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = write(dir.path(), "matrix.csv", "id,f1,f2\nx,1,2\ny,3,4\n");
    let classes = write(dir.path(), "classes.csv", "id,class\nx,pos\ny,neg\n");

    let dataset = DatasetLoader::new()
        .with_separator(b',')
        .with_classes(vec!["pos".into()], vec!["neg".into()])
        .load(&matrix, &classes)
        .unwrap();
    assert_eq!(dataset.x[[1, 0]], 3.0);
    assert!(!dataset.has_nan());
}

#[test]
fn test_missing_matrix_file_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DatasetLoader::new()
        .load(dir.path().join("absent.txt"), dir.path().join("classes.txt"))
        .unwrap_err();
    assert!(matches!(err, ExseekError::DataError(_)));
}
