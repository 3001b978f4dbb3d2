use regex::{Regex, RegexBuilder};
use tracing::info;

use crate::domain::{AccessionSet, SpeciesName};
use crate::error::BigscriptError;
use crate::manifest::{Manifest, unique_samples};

pub fn species_pattern(species: &SpeciesName) -> Result<Regex, BigscriptError> {
    let pattern = format!(
        r"^{}[_A-Za-z]*\s+{}[_A-Za-z]*\b",
        regex::escape(species.genus()),
        regex::escape(species.epithet())
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| BigscriptError::InvalidSpecies(err.to_string()))
}

pub fn resolve_by_species(
    manifest: &Manifest,
    species: &SpeciesName,
) -> Result<AccessionSet, BigscriptError> {
    let species = species.canonical();
    let pattern = species_pattern(&species)?;
    let rows = manifest.filter(|row| pattern.is_match(&row.species_label));
    if rows.is_empty() {
        return Err(BigscriptError::NoSpeciesMatch(species.to_string()));
    }
    info!("found {} files for species: {species}", rows.len());
    AccessionSet::new(unique_samples(rows))
}

pub fn resolve_by_species_exact(
    manifest: &Manifest,
    species: &SpeciesName,
) -> Result<AccessionSet, BigscriptError> {
    let species = species.canonical();
    let rows = manifest.rows_for_species_exact(&species);
    if rows.is_empty() {
        return Err(BigscriptError::NoSpeciesMatch(species.to_string()));
    }
    info!("found {} files for species: {species}", rows.len());
    AccessionSet::new(unique_samples(rows))
}

pub fn resolve_by_accessions<I, S>(ids: I) -> Result<AccessionSet, BigscriptError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ids = ids
        .into_iter()
        .flat_map(|id| {
            id.as_ref()
                .split(',')
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    AccessionSet::new(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(species: &str, label: &str) -> bool {
        let species: SpeciesName = species.parse().unwrap();
        species_pattern(&species).unwrap().is_match(label)
    }

    #[test]
    fn lineage_suffixes_match() {
        assert!(matches("Campylobacter coli", "Campylobacter_D coli"));
        assert!(matches("Escherichia coli", "Escherichia coli_A"));
        assert!(matches("escherichia COLI", "Escherichia coli"));
    }

    #[test]
    fn other_species_do_not_match() {
        assert!(!matches("Escherichia coli", "Escherichia fergusonii"));
        assert!(!matches("Escherichia coli", "Shigella flexneri"));
        assert!(!matches("Escherichia coli", "Candidatus Escherichia coli"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert!(!matches("E.coli x", "Eacoli x"));
    }

    #[test]
    fn accession_lists_split_on_commas() {
        let set = resolve_by_accessions(["SAMN1,SAMN2", "SAMN2", " SAMN3 "]).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), ["SAMN1", "SAMN2", "SAMN3"]);
    }
}
