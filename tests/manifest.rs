use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use bigscript::domain::SpeciesName;
use bigscript::error::BigscriptError;
use bigscript::manifest::Manifest;
use bigscript::resolve::{resolve_by_accessions, resolve_by_species, resolve_by_species_exact};

const TSV: &str = "sample\tspecies_sylph\ttar_xz\ttar_xz_url\ttar_xz_md5\tfilename_in_tar_xz\n\
SAMN00000001\tEscherichia coli\tecoli.1.tar.xz\thttps://x/ecoli.1.tar.xz\taaa\tecoli.1/SAMN00000001.fa\n\
SAMN00000002\tEscherichia coli_A\tecoli.1.tar.xz\thttps://x/ecoli.1.tar.xz\taaa\tecoli.1/SAMN00000002.fa\n\
SAMN00000003\tClostridioides difficile\tcdiff.1.tar.xz\thttps://x/cdiff.1.tar.xz\tbbb\tcdiff.1/SAMN00000003.fa\n\
SAMN00000004\tEscherichia marmotae\tecoli.2.tar.xz\thttps://x/ecoli.2.tar.xz\tccc\tecoli.2/SAMN00000004.fa\n";

fn write_gz(path: &Utf8PathBuf, text: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn first_load_writes_cache_and_later_loads_use_it() {
    let (_temp, root) = temp_root();
    let source = root.join("file_list.tsv.gz");
    let cache = root.join("metadata/file_list.bin");
    write_gz(&source, TSV);

    let parsed = Manifest::load(&source, &cache).unwrap();
    assert_eq!(parsed.len(), 4);
    assert!(cache.as_std_path().exists());

    std::fs::remove_file(&source).unwrap();
    let cached = Manifest::load(&source, &cache).unwrap();
    assert_eq!(cached, parsed);
}

#[test]
fn missing_source_without_cache_is_reported() {
    let (_temp, root) = temp_root();
    let err = Manifest::load(&root.join("absent.tsv.gz"), &root.join("absent.bin")).unwrap_err();
    assert_matches!(err, BigscriptError::ManifestMissing(_));
}

#[test]
fn fuzzy_species_includes_lineage_suffixes() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let species: SpeciesName = "escherichia coli".parse().unwrap();

    let accessions = resolve_by_species(&manifest, &species).unwrap();
    let ids = accessions.iter().collect::<Vec<_>>();
    assert_eq!(ids, vec!["SAMN00000001", "SAMN00000002"]);

    let exact = resolve_by_species_exact(&manifest, &"Escherichia coli".parse().unwrap()).unwrap();
    assert_eq!(exact.iter().collect::<Vec<_>>(), vec!["SAMN00000001"]);
}

#[test]
fn repeated_species_resolution_is_stable() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let species: SpeciesName = "Escherichia coli".parse().unwrap();

    let first = resolve_by_species(&manifest, &species).unwrap();
    let second = resolve_by_species(&manifest, &species).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.iter().collect::<Vec<_>>(),
        second.iter().collect::<Vec<_>>()
    );
    assert_eq!(first.len(), 2);
}

#[test]
fn synonym_resolves_to_current_name() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let species: SpeciesName = "Clostridium difficile".parse().unwrap();
    let accessions = resolve_by_species(&manifest, &species).unwrap();
    assert_eq!(accessions.iter().collect::<Vec<_>>(), vec!["SAMN00000003"]);
}

#[test]
fn unknown_species_is_a_resolution_error() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let species: SpeciesName = "Listeria monocytogenes".parse().unwrap();
    assert_matches!(
        resolve_by_species(&manifest, &species),
        Err(BigscriptError::NoSpeciesMatch(_))
    );
}

#[test]
fn accession_lists_split_and_dedupe() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let accessions =
        resolve_by_accessions(["SAMN00000004,SAMN00000001", "SAMN00000004", "SAMN99999999"])
            .unwrap();
    assert_eq!(accessions.len(), 3);

    let rows = manifest.rows_for(&accessions);
    let ids = rows.iter().map(|row| row.sample_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["SAMN00000001", "SAMN00000004"]);
}

#[test]
fn distinct_tarballs_in_file_order() {
    let manifest = Manifest::from_reader(TSV.as_bytes()).unwrap();
    let names = manifest
        .tarballs()
        .into_iter()
        .map(|tarball| tarball.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["ecoli.1.tar.xz", "cdiff.1.tar.xz", "ecoli.2.tar.xz"]);
}
