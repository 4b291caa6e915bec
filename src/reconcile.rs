//! Reconciliation of secondary alternates across files.
//!
//! Files loaded at different times may describe the same multiallelic site
//! with their secondary alternates in different orders, or with different
//! subsets. Genotype allele indices refer to each file's own alternate
//! list, so before the per-study view can present one alternate list, the
//! lists must be merged and every genotype remapped to the merged indices.

use crate::variant::AlternateCoordinate;

use std::collections::BTreeMap;


//-----------------------------------------------------------------------------

/// Decoded sample data of one file, as input to reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct FileSampleData {
    /// Secondary alternates in this file's order.
    pub alternates: Vec<AlternateCoordinate>,
    /// Genotype string per sample id, with allele indices into this file's list.
    pub genotypes: BTreeMap<i32, String>,
}

fn signature(alternates: &[AlternateCoordinate]) -> String {
    let parts: Vec<String> = alternates.iter().map(AlternateCoordinate::signature).collect();
    parts.join("|")
}

//-----------------------------------------------------------------------------

/// Merges the alternate lists of all files and remaps genotypes to the union.
///
/// Returns the merged secondary alternate list; each file's alternates are
/// replaced by it and its genotype allele indices rewritten accordingly.
/// Files that already agree are left untouched, so the operation is
/// idempotent. Allele 0 (reference) and allele 1 (primary alternate) never
/// move; missing alleles and phasing separators are preserved.
pub fn reconcile(files: &mut [FileSampleData]) -> Vec<AlternateCoordinate> {
    if files.is_empty() {
        return Vec::new();
    }

    // One distinct alternate list means nothing to do.
    let first_signature = signature(&files[0].alternates);
    if files.iter().all(|f| signature(&f.alternates) == first_signature) {
        return files[0].alternates.clone();
    }

    // Union of the alternate lists in first-seen order.
    let mut union: Vec<AlternateCoordinate> = Vec::new();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();
    for file in files.iter() {
        for alternate in &file.alternates {
            let key = alternate.signature();
            if !positions.contains_key(&key) {
                positions.insert(key, union.len());
                union.push(alternate.clone());
            }
        }
    }

    for file in files.iter_mut() {
        // Old secondary index -> new secondary index.
        let remap: Vec<usize> = file.alternates.iter()
            .map(|alt| positions[&alt.signature()])
            .collect();
        let identity = remap.iter().enumerate().all(|(i, v)| i == *v);
        if !identity {
            for genotype in file.genotypes.values_mut() {
                *genotype = remap_genotype(genotype, &remap);
            }
        }
        file.alternates = union.clone();
    }

    union
}

/// Rewrites the allele indices of one genotype string.
///
/// `remap[i]` is the new position of the secondary alternate that was at
/// position `i`; allele index `i + 2` becomes `remap[i] + 2`.
fn remap_genotype(genotype: &str, remap: &[usize]) -> String {
    let mut result = String::with_capacity(genotype.len());
    let mut allele = String::new();
    for c in genotype.chars() {
        if c == '/' || c == '|' {
            push_allele(&mut result, &allele, remap);
            allele.clear();
            result.push(c);
        } else {
            allele.push(c);
        }
    }
    push_allele(&mut result, &allele, remap);
    result
}

fn push_allele(result: &mut String, allele: &str, remap: &[usize]) {
    match allele.parse::<usize>() {
        Ok(index) if index >= 2 => {
            match remap.get(index - 2) {
                Some(new_index) => result.push_str(&(new_index + 2).to_string()),
                None => result.push_str(allele),
            }
        }
        _ => result.push_str(allele),
    }
}

//-----------------------------------------------------------------------------
