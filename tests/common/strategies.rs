use proptest::prelude::*;

/// Random DAG over `n` nodes as `(node, parents)` where every parent has a
/// lower index, so the graph is acyclic by construction
pub fn dag_strategy() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    (2usize..10).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::btree_set(0..i, 0..=i.min(3))
                        .prop_map(|parents| parents.into_iter().collect::<Vec<_>>())
                        .boxed()
                }
            })
            .collect::<Vec<_>>()
            .prop_map(|parents| parents.into_iter().enumerate().collect())
    })
}
