//! Column contracts of the two input datasets.
//!
//! Column names are part of the file contract; renaming one upstream must
//! surface as a `SchemaError` at load time.

use super::domain::{ColumnKind, ExpectedColumn, FillRule, SchemaSpec};

/// DPE housing dataset columns.
pub mod housing {
    pub const TYPE_BATIMENT: &str = "type_batiment";
    pub const ETIQUETTE_DPE: &str = "etiquette_dpe";
    pub const ETIQUETTE_GES: &str = "etiquette_ges";
    pub const TYPE_ENERGIE: &str = "type_energie_recodee";
    pub const CODE_POSTAL: &str = "code_postal_ban";
    pub const SURFACE: &str = "surface_habitable_logement";
    pub const COUT_TOTAL: &str = "cout_total_5_usages";
    pub const CONSO_PAR_M2: &str = "conso_5_usages_par_m2_ef";
    pub const CONSO_TOTALE: &str = "conso_5_usages_ef";
    pub const EMISSION_GES: &str = "emission_ges_5_usages";
    pub const CONSO_ECS: &str = "conso_ecs_ef";
    pub const CONSO_AUXILIAIRES: &str = "conso_auxiliaires_ef";
    pub const CONSO_REFROIDISSEMENT: &str = "conso_refroidissement_ef";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Enedis electricity consumption dataset columns.
pub mod enedis {
    pub const ANNEE: &str = "Année";
    pub const CODE_POSTAL: &str = "code_postal";
    pub const ADRESSE: &str = "adresse_norm";
    pub const NB_LOGEMENTS: &str = "Nombre de logements";
    pub const CONSO_TOTALE: &str = "Consommation annuelle totale de l'adresse (MWh)";
    pub const CONSO_MOY_LOGEMENT: &str =
        "Consommation annuelle moyenne par logement de l'adresse (MWh)";
    pub const CONSO_MOY_COMMUNE: &str = "Consommation annuelle moyenne de la commune (MWh)";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Prediction input fields that only exist in the upload template.
pub mod prediction {
    pub const COUT_ECLAIRAGE: &str = "cout_eclairage";
    pub const COUT_ECS: &str = "cout_ecs";
    pub const COUT_AUXILIAIRES: &str = "cout_auxiliaires";
    pub const EMISSION_GES_ECS: &str = "emission_ges_ecs";

    /// Columns appended to an exported batch.
    pub const PREDICTED_LABEL: &str = "etiquette_dpe_predite";
    pub const PREDICTED_COST: &str = "cout_total_predit";
    pub const ERROR: &str = "erreur";
}

pub fn housing_spec() -> SchemaSpec {
    use housing::*;
    use ColumnKind::*;

    SchemaSpec {
        name: "dpe_housing",
        columns: vec![
            ExpectedColumn::required(TYPE_BATIMENT, Categorical),
            ExpectedColumn::required(ETIQUETTE_DPE, Categorical),
            ExpectedColumn::required(ETIQUETTE_GES, Categorical),
            ExpectedColumn::required(TYPE_ENERGIE, Categorical),
            ExpectedColumn::required(CODE_POSTAL, Identifier).with_fill(FillRule::PostalCode),
            ExpectedColumn::required(SURFACE, Numeric),
            ExpectedColumn::required(COUT_TOTAL, Numeric),
            ExpectedColumn::required(CONSO_PAR_M2, Numeric),
            ExpectedColumn::required(CONSO_TOTALE, Numeric),
            ExpectedColumn::required(EMISSION_GES, Numeric),
            ExpectedColumn::required(CONSO_ECS, Numeric),
            ExpectedColumn::required(CONSO_AUXILIAIRES, Numeric),
            ExpectedColumn::required(CONSO_REFROIDISSEMENT, Numeric),
            ExpectedColumn::optional(LATITUDE, Geo),
            ExpectedColumn::optional(LONGITUDE, Geo),
        ],
    }
}

pub fn enedis_spec() -> SchemaSpec {
    use enedis::*;
    use ColumnKind::*;

    SchemaSpec {
        name: "enedis_consumption",
        columns: vec![
            ExpectedColumn::required(ANNEE, Numeric),
            ExpectedColumn::required(CODE_POSTAL, Identifier).with_fill(FillRule::PostalCode),
            ExpectedColumn::required(ADRESSE, Categorical),
            ExpectedColumn::required(NB_LOGEMENTS, Numeric),
            ExpectedColumn::required(CONSO_TOTALE, Numeric),
            ExpectedColumn::required(CONSO_MOY_LOGEMENT, Numeric),
            ExpectedColumn::required(CONSO_MOY_COMMUNE, Numeric),
            ExpectedColumn::optional(LATITUDE, Geo),
            ExpectedColumn::optional(LONGITUDE, Geo),
        ],
    }
}

/// Batch prediction upload: every model feature must be present. Cells are
/// read loosely so that one bad row is reported on its own instead of failing
/// the whole file.
pub fn prediction_input_spec() -> SchemaSpec {
    use housing::*;
    use prediction::*;
    use ColumnKind::*;

    SchemaSpec {
        name: "prediction_input",
        columns: vec![
            ExpectedColumn::required(CONSO_AUXILIAIRES, Categorical),
            ExpectedColumn::required(COUT_ECLAIRAGE, Categorical),
            ExpectedColumn::required(CONSO_PAR_M2, Categorical),
            ExpectedColumn::required(EMISSION_GES_ECS, Categorical),
            ExpectedColumn::required(CONSO_TOTALE, Categorical),
            ExpectedColumn::required(SURFACE, Categorical),
            ExpectedColumn::required(COUT_ECS, Categorical),
            ExpectedColumn::required(COUT_AUXILIAIRES, Categorical),
            ExpectedColumn::required(TYPE_BATIMENT, Categorical),
            ExpectedColumn::required(CONSO_ECS, Categorical),
            ExpectedColumn::required(EMISSION_GES, Categorical),
            ExpectedColumn::required(ETIQUETTE_GES, Categorical),
            ExpectedColumn::required(CONSO_REFROIDISSEMENT, Categorical),
            ExpectedColumn::required(TYPE_ENERGIE, Categorical),
        ],
    }
}

/// Housing-count categories of the Enedis page: right-inclusive edges.
pub const HOUSING_COUNT_EDGES: [f64; 6] = [0.0, 5.0, 10.0, 20.0, 50.0, 1000.0];
pub const HOUSING_COUNT_LABELS: [&str; 5] = ["1-5", "6-10", "11-20", "21-50", "50+"];
