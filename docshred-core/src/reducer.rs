//! Schema Reducer (§4.3): folds observations into the Schema Store under the
//! type-widening lattice, respecting `forced` overrides.

use crate::observer::Observation;
use crate::schema::{widen, TypeMode};
use crate::store::SchemaStore;
use crate::Result;

/// Folds a single `(path, observed)` pair into `store`: upsert-if-absent,
/// else widen against the stored value and update only if it changed.
/// A `forced=true` entry is a fixpoint — no observation moves it (§4.3).
pub fn reduce_one(store: &dyn SchemaStore, path: &str, observed: TypeMode) -> Result<()> {
    match store.get_field(path)? {
        None => store.upsert_field(path, observed),
        Some(entry) if entry.forced => Ok(()),
        Some(entry) => {
            let widened = widen(entry.type_mode, observed);
            if widened != entry.type_mode {
                store.upsert_field(path, widened)?;
            }
            Ok(())
        }
    }
}

/// Folds a whole stream of observations into `store`. The per-path fold is
/// sequential (§5), but observations may arrive from any number of parallel
/// observer workers without changing the result, since `widen` is
/// commutative and associative (§8 "Monotonicity").
pub fn reduce_observations(
    store: &dyn SchemaStore,
    observations: impl IntoIterator<Item = Observation>,
) -> Result<()> {
    for obs in observations {
        reduce_one(store, &obs.path, obs.type_mode)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BaseType, Mode};
    use crate::store::InMemorySchemaStore;

    fn tm(bt: BaseType, m: Mode) -> TypeMode {
        TypeMode::new(bt, m)
    }

    #[test]
    fn first_observation_is_stored_as_is() {
        let store = InMemorySchemaStore::new();
        reduce_one(&store, "a", tm(BaseType::Integer, Mode::Nullable)).unwrap();
        assert_eq!(store.get_field("a").unwrap().unwrap().type_mode, tm(BaseType::Integer, Mode::Nullable));
    }

    #[test]
    fn widening_across_multiple_observations_matches_scenario_1() {
        let store = InMemorySchemaStore::new();
        reduce_one(&store, "a", tm(BaseType::Integer, Mode::Nullable)).unwrap();
        reduce_one(&store, "a", tm(BaseType::Float, Mode::Nullable)).unwrap();
        assert_eq!(store.get_field("a").unwrap().unwrap().type_mode, tm(BaseType::Float, Mode::Nullable));

        reduce_one(&store, "a", tm(BaseType::String, Mode::Nullable)).unwrap();
        assert_eq!(store.get_field("a").unwrap().unwrap().type_mode, tm(BaseType::String, Mode::Nullable));
    }

    #[test]
    fn forced_field_ignores_further_observations() {
        let store = InMemorySchemaStore::new();
        store.force_field("zip", tm(BaseType::String, Mode::Nullable)).unwrap();
        reduce_one(&store, "zip", tm(BaseType::Integer, Mode::Nullable)).unwrap();
        let entry = store.get_field("zip").unwrap().unwrap();
        assert_eq!(entry.type_mode, tm(BaseType::String, Mode::Nullable));
        assert!(entry.forced);
    }

    #[test]
    fn reduction_is_idempotent() {
        let obs = vec![
            Observation { path: "a".into(), type_mode: tm(BaseType::Integer, Mode::Nullable) },
            Observation { path: "a".into(), type_mode: tm(BaseType::Float, Mode::Nullable) },
            Observation { path: "b".into(), type_mode: tm(BaseType::String, Mode::Repeated) },
        ];

        let store1 = InMemorySchemaStore::new();
        reduce_observations(&store1, obs.clone()).unwrap();
        let mut first_pass = store1.all_fields().unwrap();
        first_pass.sort_by(|a, b| a.path.cmp(&b.path));

        reduce_observations(&store1, obs).unwrap();
        let mut second_pass = store1.all_fields().unwrap();
        second_pass.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn reduction_order_does_not_affect_final_schema() {
        let obs_forward = vec![
            Observation { path: "a".into(), type_mode: tm(BaseType::Integer, Mode::Nullable) },
            Observation { path: "a".into(), type_mode: tm(BaseType::Boolean, Mode::Nullable) },
            Observation { path: "a".into(), type_mode: tm(BaseType::Float, Mode::Nullable) },
        ];
        let mut obs_reversed = obs_forward.clone();
        obs_reversed.reverse();

        let store_forward = InMemorySchemaStore::new();
        reduce_observations(&store_forward, obs_forward).unwrap();

        let store_reversed = InMemorySchemaStore::new();
        reduce_observations(&store_reversed, obs_reversed).unwrap();

        assert_eq!(
            store_forward.get_field("a").unwrap().unwrap().type_mode,
            store_reversed.get_field("a").unwrap().unwrap().type_mode
        );
    }
}
