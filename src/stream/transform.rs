//! Transformations and terminals shared by eager streams and the
//! store-side range executor.
//!
//! A lazy stream does not evaluate its operators locally: `map`, `filter`,
//! and `concat_map` append [`Transform`]s to the read it will eventually
//! issue, and `count`/`reduce`/`group_map_reduce` lower to a [`Terminal`]
//! shipped with the same read. Stores execute both with the functions in
//! this module, and the eager operator set reuses the identical code, so
//! lowering never changes a result.

use crate::core::error::{TesseraError, TesseraResult};
use crate::kv::datum::Datum;
use crate::protocol::cache::TemporaryCache;
use crate::stream::func::FuncExpr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An elementwise transformation carried by a range read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    /// Replace each element with `f(element)`.
    Map(FuncExpr),
    /// Keep elements for which `f(element)` is truthy.
    Filter(FuncExpr),
    /// Replace each element with the elements of the array
    /// `f(element)`, in order.
    ConcatMap(FuncExpr),
}

/// A terminal aggregation carried by a range read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminal {
    /// Count elements.
    Count,
    /// Left fold with `f`. The base, if any, stays client-side and is
    /// folded in after the per-shard results are merged.
    Reduce { f: FuncExpr },
    /// Group by `group(x)`, map to `map(x)`, reduce each group with
    /// `reduce`. The base, if any, stays client-side.
    GroupMapReduce {
        group: FuncExpr,
        map: FuncExpr,
        reduce: FuncExpr,
    },
}

/// The result of running a terminal over one store's slice of a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalResult {
    /// A single datum (count total or reduction value).
    Datum(Datum),
    /// A reduction over zero elements.
    Empty,
    /// Per-group reductions, sorted by group key.
    Grouped(Vec<(Datum, Datum)>),
}

/// Run one element through a transformation stack.
///
/// Returns the zero or more elements the stack produces for it, in order.
pub fn apply_transforms(stack: &[Transform], datum: Datum) -> TesseraResult<Vec<Datum>> {
    let mut current = vec![datum];
    for transform in stack {
        let mut next = Vec::with_capacity(current.len());
        match transform {
            Transform::Map(f) => {
                for d in &current {
                    next.push(f.call1(d)?);
                }
            }
            Transform::Filter(f) => {
                for d in current {
                    if f.call1(&d)?.is_truthy() {
                        next.push(d);
                    }
                }
            }
            Transform::ConcatMap(f) => {
                for d in &current {
                    let expanded = f.call1(d)?;
                    next.extend(expanded.as_arr()?.iter().cloned());
                }
            }
        }
        current = next;
    }
    Ok(current)
}

/// Incremental execution of one terminal over a sequence of elements.
#[derive(Debug)]
pub enum TerminalAccumulator<'a> {
    Count {
        n: u64,
    },
    Reduce {
        f: &'a FuncExpr,
        acc: Option<Datum>,
    },
    GroupMapReduce {
        group: &'a FuncExpr,
        map: &'a FuncExpr,
        reduce: &'a FuncExpr,
        groups: BTreeMap<Datum, Datum>,
    },
}

impl<'a> TerminalAccumulator<'a> {
    /// Start accumulating for `terminal`.
    pub fn new(terminal: &'a Terminal) -> Self {
        match terminal {
            Terminal::Count => Self::Count { n: 0 },
            Terminal::Reduce { f } => Self::Reduce { f, acc: None },
            Terminal::GroupMapReduce { group, map, reduce } => Self::GroupMapReduce {
                group,
                map,
                reduce,
                groups: BTreeMap::new(),
            },
        }
    }

    /// Feed one element.
    pub fn feed(&mut self, elem: &Datum) -> TesseraResult<()> {
        match self {
            Self::Count { n } => {
                *n += 1;
            }
            Self::Reduce { f, acc } => {
                *acc = Some(match acc.take() {
                    None => elem.clone(),
                    Some(prev) => f.call2(&prev, elem)?,
                });
            }
            Self::GroupMapReduce {
                group,
                map,
                reduce,
                groups,
            } => {
                let key = group.call1(elem)?;
                let mapped = map.call1(elem)?;
                match groups.remove(&key) {
                    None => {
                        groups.insert(key, mapped);
                    }
                    Some(prev) => {
                        let combined = reduce.call2(&prev, &mapped)?;
                        groups.insert(key, combined);
                    }
                }
            }
        }
        Ok(())
    }

    /// Finish and produce the shard-level result.
    pub fn finish(self) -> TerminalResult {
        match self {
            Self::Count { n } => TerminalResult::Datum(Datum::Num(n as f64)),
            Self::Reduce { acc, .. } => match acc {
                None => TerminalResult::Empty,
                Some(value) => TerminalResult::Datum(value),
            },
            Self::GroupMapReduce { groups, .. } => {
                TerminalResult::Grouped(groups.into_iter().collect())
            }
        }
    }
}

/// Merge per-shard terminal results into the whole-range result.
///
/// Used by read unsharding; the functions involved are compiled through
/// the temporary cache.
pub fn merge_terminal_results(
    terminal: &Terminal,
    results: Vec<TerminalResult>,
    cache: &TemporaryCache,
) -> TesseraResult<TerminalResult> {
    match terminal {
        Terminal::Count => {
            let mut total = 0.0;
            for result in results {
                match result {
                    TerminalResult::Datum(Datum::Num(n)) => total += n,
                    other => {
                        return Err(TesseraError::invariant(format!(
                            "count shard returned {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(TerminalResult::Datum(Datum::Num(total)))
        }
        Terminal::Reduce { f } => {
            let f = f.compile(cache);
            let mut acc: Option<Datum> = None;
            for result in results {
                match result {
                    TerminalResult::Empty => {}
                    TerminalResult::Datum(value) => {
                        acc = Some(match acc.take() {
                            None => value,
                            Some(prev) => f.call2(&prev, &value)?,
                        });
                    }
                    other => {
                        return Err(TesseraError::invariant(format!(
                            "reduce shard returned {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(match acc {
                None => TerminalResult::Empty,
                Some(value) => TerminalResult::Datum(value),
            })
        }
        Terminal::GroupMapReduce { reduce, .. } => {
            let reduce = reduce.compile(cache);
            let mut groups: BTreeMap<Datum, Datum> = BTreeMap::new();
            for result in results {
                match result {
                    TerminalResult::Grouped(pairs) => {
                        for (key, value) in pairs {
                            match groups.remove(&key) {
                                None => {
                                    groups.insert(key, value);
                                }
                                Some(prev) => {
                                    let combined = reduce.call2(&prev, &value)?;
                                    groups.insert(key, combined);
                                }
                            }
                        }
                    }
                    other => {
                        return Err(TesseraError::invariant(format!(
                            "group-map-reduce shard returned {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(TerminalResult::Grouped(groups.into_iter().collect()))
        }
    }
}

/// Present a merged count result to the client.
pub fn finish_count(result: TerminalResult) -> TesseraResult<Datum> {
    match result {
        TerminalResult::Datum(value) => Ok(value),
        other => Err(TesseraError::invariant(format!(
            "count produced {:?}",
            other
        ))),
    }
}

/// Present a merged reduce result to the client, folding in the base.
pub fn finish_reduce(
    result: TerminalResult,
    base: Option<&Datum>,
    f: &FuncExpr,
) -> TesseraResult<Datum> {
    match (result, base) {
        (TerminalResult::Datum(value), Some(base)) => f.call2(base, &value),
        (TerminalResult::Datum(value), None) => Ok(value),
        (TerminalResult::Empty, Some(base)) => Ok(base.clone()),
        (TerminalResult::Empty, None) => Err(TesseraError::user_query(
            "Cannot reduce over an empty stream with no base.",
        )),
        (other, _) => Err(TesseraError::invariant(format!(
            "reduce produced {:?}",
            other
        ))),
    }
}

/// Present a merged group-map-reduce result to the client as an array of
/// `{group, reduction}` objects, folding the base into each group.
pub fn finish_group_map_reduce(
    result: TerminalResult,
    base: Option<&Datum>,
    reduce: &FuncExpr,
) -> TesseraResult<Datum> {
    let pairs = match result {
        TerminalResult::Grouped(pairs) => pairs,
        other => {
            return Err(TesseraError::invariant(format!(
                "group-map-reduce produced {:?}",
                other
            )))
        }
    };
    let mut rows = Vec::with_capacity(pairs.len());
    for (group, reduction) in pairs {
        let reduction = match base {
            Some(base) => reduce.call2(base, &reduction)?,
            None => reduction,
        };
        rows.push(Datum::obj([("group", group), ("reduction", reduction)]));
    }
    Ok(Datum::Arr(rows))
}
