//! Comparison service: resolve two selectors and compute signed deltas.

use tracing::debug;

use crate::common::error::{EngineError, EngineResult};
use crate::data::domain::{Table, Value};
use crate::data::schemas::housing;

use super::domain::{
    Comparison, Direction, DirectionTable, Favorable, FieldDelta, Record, RowSelector, Verdict,
};

/// Resolve a selector to exactly one record of `table`.
pub fn resolve<'t>(table: &'t Table, selector: &RowSelector) -> EngineResult<Record<'t>> {
    let row = match selector {
        RowSelector::Index(i) if *i < table.len() => *i,
        RowSelector::Index(_) => return Err(EngineError::RecordNotFound),
        RowSelector::Filters(filters) => {
            let view = filters.apply(table)?;
            match view.row_indices() {
                [] => return Err(EngineError::RecordNotFound),
                [only] => *only,
                many => {
                    return Err(EngineError::AmbiguousSelection {
                        matched: many.len(),
                    })
                }
            }
        }
    };
    Ok(Record { table, row })
}

/// Field-wise comparison, deltas are `a - b` in `fields` order.
pub fn compare<S: AsRef<str>>(
    a: &Record<'_>,
    b: &Record<'_>,
    fields: &[S],
    directions: &DirectionTable,
) -> EngineResult<Comparison> {
    let mut deltas = Vec::with_capacity(fields.len());
    let mut verdict = Verdict::default();

    for field in fields.iter().map(AsRef::as_ref) {
        let mismatch = |side| EngineError::SchemaMismatch {
            field: field.to_string(),
            side,
        };
        let value_a = a.get(field).ok_or_else(|| mismatch("A"))?;
        let value_b = b.get(field).ok_or_else(|| mismatch("B"))?;
        let direction = directions
            .get(field)
            .ok_or_else(|| EngineError::UnknownDirection {
                field: field.to_string(),
            })?;

        let delta = match (value_a.as_f64(), value_b.as_f64()) {
            (Some(x), Some(y)) => Some(x - y),
            _ => None,
        };
        let side = favorable(delta, direction);
        match side {
            Favorable::A => verdict.a += 1,
            Favorable::B => verdict.b += 1,
            Favorable::Equal => verdict.equal += 1,
        }
        deltas.push(FieldDelta {
            field: field.to_string(),
            value_a: value_a.clone(),
            value_b: value_b.clone(),
            delta,
            favorable: side,
        });
    }

    debug!(
        row_a = a.row(),
        row_b = b.row(),
        fields = deltas.len(),
        favours_a = verdict.a,
        favours_b = verdict.b,
        "records compared"
    );
    Ok(Comparison { deltas, verdict })
}

/// Resolve both selectors against one table and compare the records.
pub fn compare_selected<S: AsRef<str>>(
    table: &Table,
    a: &RowSelector,
    b: &RowSelector,
    fields: &[S],
    directions: &DirectionTable,
) -> EngineResult<Comparison> {
    let ra = resolve(table, a)?;
    let rb = resolve(table, b)?;
    compare(&ra, &rb, fields, directions)
}

fn favorable(delta: Option<f64>, direction: Direction) -> Favorable {
    match delta {
        Some(d) if d < 0.0 => match direction {
            Direction::LowerIsBetter => Favorable::A,
            Direction::HigherIsBetter => Favorable::B,
        },
        Some(d) if d > 0.0 => match direction {
            Direction::LowerIsBetter => Favorable::B,
            Direction::HigherIsBetter => Favorable::A,
        },
        _ => Favorable::Equal,
    }
}

/// Selector label shown to the user: `type - etiquette - code postal - row`.
pub fn record_label(table: &Table, row: usize) -> EngineResult<String> {
    let cell = |col| table.value(row, col).map(Value::to_string);
    Ok(format!(
        "{} - {} - {} - {}",
        cell(housing::TYPE_BATIMENT)?,
        cell(housing::ETIQUETTE_DPE)?,
        cell(housing::CODE_POSTAL)?,
        row
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::ColumnKind;
    use crate::query::filter::{FilterSet, Predicate};

    fn table() -> Table {
        Table::from_rows(
            &[
                (housing::TYPE_BATIMENT, ColumnKind::Categorical),
                (housing::ETIQUETTE_DPE, ColumnKind::Categorical),
                (housing::CODE_POSTAL, ColumnKind::Identifier),
                (housing::COUT_TOTAL, ColumnKind::Numeric),
                (housing::EMISSION_GES, ColumnKind::Numeric),
                (housing::SURFACE, ColumnKind::Numeric),
            ],
            vec![
                vec![
                    Value::text("maison"),
                    Value::text("D"),
                    Value::text("69001"),
                    Value::Float(1850.5),
                    Value::Int(900),
                    Value::Int(100),
                ],
                vec![
                    Value::text("appartement"),
                    Value::text("B"),
                    Value::text("69003"),
                    Value::Int(720),
                    Value::Int(900),
                    Value::Int(45),
                ],
                vec![
                    Value::text("maison"),
                    Value::text("F"),
                    Value::text("69003"),
                    Value::Null,
                    Value::Int(2500),
                    Value::Int(130),
                ],
            ],
        )
        .unwrap()
    }

    fn directions() -> DirectionTable {
        DirectionTable::dpe_default().with(housing::SURFACE, Direction::HigherIsBetter)
    }

    const FIELDS: [&str; 3] = [housing::COUT_TOTAL, housing::EMISSION_GES, housing::SURFACE];

    #[test]
    fn lower_cost_favours_the_cheaper_record() {
        let t = table();
        let cmp = compare_selected(
            &t,
            &RowSelector::Index(0),
            &RowSelector::Index(1),
            &FIELDS,
            &directions(),
        )
        .unwrap();
        assert_eq!(cmp.deltas[0].delta, Some(1130.5));
        assert_eq!(cmp.deltas[0].favorable, Favorable::B);
        assert_eq!(cmp.deltas[1].delta, Some(0.0));
        assert_eq!(cmp.deltas[1].favorable, Favorable::Equal);
        assert_eq!(cmp.deltas[2].favorable, Favorable::A);
        assert_eq!(cmp.verdict, Verdict { a: 1, b: 1, equal: 1 });
        assert_eq!(cmp.verdict.overall(), Favorable::Equal);
    }

    #[test]
    fn swapping_records_negates_deltas_and_flips_sides() {
        let t = table();
        let dirs = directions();
        for (i, j) in [(0, 1), (1, 2), (0, 2)] {
            let a = resolve(&t, &RowSelector::Index(i)).unwrap();
            let b = resolve(&t, &RowSelector::Index(j)).unwrap();
            let ab = compare(&a, &b, &FIELDS, &dirs).unwrap();
            let ba = compare(&b, &a, &FIELDS, &dirs).unwrap();
            for (x, y) in ab.deltas.iter().zip(&ba.deltas) {
                assert_eq!(x.delta, y.delta.map(|d| -d));
                assert_eq!(x.favorable, y.favorable.flipped());
                assert_eq!(x.value_a, y.value_b);
            }
            assert_eq!(ab.verdict.a, ba.verdict.b);
            assert_eq!(ab.verdict.b, ba.verdict.a);
        }
    }

    #[test]
    fn missing_value_has_no_delta() {
        let t = table();
        let cmp = compare_selected(
            &t,
            &RowSelector::Index(0),
            &RowSelector::Index(2),
            &[housing::COUT_TOTAL],
            &directions(),
        )
        .unwrap();
        assert_eq!(cmp.deltas[0].delta, None);
        assert_eq!(cmp.deltas[0].favorable, Favorable::Equal);
        assert!(cmp.deltas[0].value_b.is_null());
    }

    #[test]
    fn filter_selectors_must_match_exactly_one_row() {
        let t = table();
        let one = RowSelector::Filters(
            FilterSet::new().with(Predicate::equals(housing::ETIQUETTE_DPE, "B")),
        );
        assert_eq!(resolve(&t, &one).unwrap().row(), 1);

        let many = RowSelector::Filters(
            FilterSet::new().with(Predicate::equals(housing::CODE_POSTAL, "69003")),
        );
        assert!(matches!(
            resolve(&t, &many).unwrap_err(),
            EngineError::AmbiguousSelection { matched: 2 }
        ));

        let none = RowSelector::Filters(
            FilterSet::new().with(Predicate::equals(housing::ETIQUETTE_DPE, "G")),
        );
        assert!(matches!(
            resolve(&t, &none).unwrap_err(),
            EngineError::RecordNotFound
        ));
        assert!(matches!(
            resolve(&t, &RowSelector::Index(9)).unwrap_err(),
            EngineError::RecordNotFound
        ));
    }

    #[test]
    fn unknown_fields_and_directions_fail() {
        let t = table();
        let a = resolve(&t, &RowSelector::Index(0)).unwrap();
        let b = resolve(&t, &RowSelector::Index(1)).unwrap();
        let err = compare(&a, &b, &["conso_ecs_ef"], &directions()).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { side: "A", .. }));

        let err = compare(&a, &b, &[housing::COUT_TOTAL], &DirectionTable::new()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDirection { .. }));
    }

    #[test]
    fn labels_read_like_the_selector() {
        let t = table();
        assert_eq!(record_label(&t, 1).unwrap(), "appartement - B - 69003 - 1");
    }
}
