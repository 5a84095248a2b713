//! Restriction enzyme names and recognition sites.

use serde_json::Value;

use hana_types::{HanaError, Result};

/// Enzyme aliases and the site they cut. Matching is case-insensitive.
pub const ENZYME_SITES: &[(&[&str], &str)] = &[
    (&["TaqI", "Taq1"], "TCGA"),
    (&["HaeIII", "Hae3"], "GGCC"),
    (
        &["DpnI", "Dpn1", "DpnII", "Dpn2", "MboI", "Mbo1", "Sau3AI"],
        "GATC",
    ),
    (&["AluI", "Alu1"], "AGCT"),
    (
        &["NlaIII", "Nla3", "FaeI", "Fae1", "FatI", "Fat1", "Hin1II", "Hsp92II"],
        "CATG",
    ),
    (&["HpaII", "Hpa2"], "CCGG"),
    (&["FokI", "Fok1"], "GGATG"),
    (&["AaaI", "Aaa1"], "CGGCG"),
    (&["HgaI", "Hga1"], "GACGC"),
    (&["BglII", "Bgl2"], "AGATCT"),
    (&["EcoRV", "EcoR5"], "GATATC"),
    (&["EcoRI", "EcoR1"], "GAATTC"),
    (&["BamHI", "BamH1"], "GGATCC"),
    (&["HindIII", "Hind3"], "AAGCTT"),
    (&["KpnI", "Kpn1"], "GGTACC"),
    (&["XbaI", "Xba1"], "TCTAGA"),
    (&["XhoI", "Xho1"], "CTCGAG"),
    (&["SacI", "Sac1"], "GAGCTC"),
    (&["PstI", "Pst1"], "CTGCAG"),
    (&["SmaI", "Sma1"], "CCCGGG"),
    (&["PvuII", "Pvu2"], "CAGCTG"),
    (&["SalI", "Sal1"], "GTCGAC"),
    (&["ScaI", "Sca1"], "AGTACT"),
    (&["SpeI", "Spe1"], "ACTAGT"),
    (&["SphI", "Sph1"], "GCATGC"),
    (&["StuI", "Stu1"], "AGGCCT"),
    (&["NdeI", "Nde1"], "CATATG"),
    (&["NotI", "Not1"], "GCGGCCGC"),
];

/// Turn an enzyme name or a literal site into an upper-case site.
pub fn canonical_site(input: &str) -> std::result::Result<String, String> {
    let upper = input.trim().to_uppercase();
    let site = ENZYME_SITES
        .iter()
        .find(|(aliases, _)| aliases.iter().any(|a| a.eq_ignore_ascii_case(&upper)))
        .map(|(_, site)| (*site).to_string())
        .unwrap_or(upper);
    if site.is_empty() {
        return Err("restriction site is empty".into());
    }
    if let Some(bad) = site.chars().find(|c| !matches!(c, 'A' | 'C' | 'G' | 'T')) {
        return Err(format!(
            "restriction site \"{site}\" contains invalid base \"{bad}\""
        ));
    }
    Ok(site)
}

/// Parameter validator form of [`canonical_site`].
pub fn canonicalize_enzyme(param: &str, value: Value) -> Result<Value> {
    let Value::String(input) = &value else {
        return Err(HanaError::InvalidValue {
            param: param.to_string(),
            message: format!("{value} is not a restriction site"),
        });
    };
    canonical_site(input)
        .map(Value::String)
        .map_err(|message| HanaError::InvalidValue {
            param: param.to_string(),
            message,
        })
}
