//! Lazy single-pass sequences of datums.
//!
//! A stream yields documents one at a time and is restartable only by
//! construction, never by rewinding. Two refinements exist: eager
//! streams over in-memory collections (with wrapper operators evaluated
//! locally) and lazy streams backed by a namespace range read (with
//! `map`/`filter`/`concat_map` pushed down into the read and terminals
//! lowered server-side). Pulling one element fetches up to
//! [`MAX_BATCH_SIZE`] elements at a time to amortise round trips.

pub mod eager;
pub mod func;
pub mod lazy;
pub mod transform;

use crate::core::error::TesseraResult;
use crate::kv::datum::Datum;
use func::FuncExpr;
use transform::{
    finish_count, finish_group_map_reduce, finish_reduce, Terminal, TerminalAccumulator,
};

/// Maximum elements returned per `next_batch` call, unless a stream
/// overrides its batch size.
pub const MAX_BATCH_SIZE: usize = crate::core::config::DEFAULT_MAX_BATCH_SIZE;

/// A single-pass sequence of datums.
///
/// A stream exclusively owns its upstream; operators consume one stream
/// and produce another. Terminals have eager defaults that drain the
/// stream locally; lazy streams override them to lower the aggregation
/// into the range read.
pub trait Stream: Send {
    /// The next element, or `None` once the stream is exhausted.
    fn next(&mut self) -> TesseraResult<Option<Datum>>;

    /// This stream's batching bound.
    fn batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Up to [`batch_size`] elements. An empty batch means exhaustion.
    ///
    /// [`batch_size`]: Stream::batch_size
    fn next_batch(&mut self) -> TesseraResult<Vec<Datum>> {
        let cap = self.batch_size();
        let mut batch = Vec::new();
        while let Some(datum) = self.next()? {
            batch.push(datum);
            if batch.len() >= cap {
                break;
            }
        }
        Ok(batch)
    }

    /// Drain the stream into a vector.
    fn drain(&mut self) -> TesseraResult<Vec<Datum>> {
        let mut all = Vec::new();
        while let Some(datum) = self.next()? {
            all.push(datum);
        }
        Ok(all)
    }

    /// Count the elements.
    fn count(&mut self) -> TesseraResult<Datum> {
        eager_count(self)
    }

    /// Left fold with `f`, starting from `base` if given.
    ///
    /// Fails with a query error on an empty stream with no base.
    fn reduce(&mut self, base: Option<&Datum>, f: &FuncExpr) -> TesseraResult<Datum> {
        eager_reduce(self, base, f)
    }

    /// Group by `group(x)`, map to `map(x)`, reduce each group with
    /// `reduce`; `base`, if given, is folded into every group. Returns
    /// an array of `{group, reduction}` objects sorted by group.
    fn group_map_reduce(
        &mut self,
        group: &FuncExpr,
        map: &FuncExpr,
        base: Option<&Datum>,
        reduce: &FuncExpr,
    ) -> TesseraResult<Datum> {
        eager_group_map_reduce(self, group, map, base, reduce)
    }
}

/// Count by draining the stream locally.
pub(crate) fn eager_count<S: Stream + ?Sized>(stream: &mut S) -> TesseraResult<Datum> {
    let terminal = Terminal::Count;
    let mut acc = TerminalAccumulator::new(&terminal);
    while let Some(datum) = stream.next()? {
        acc.feed(&datum)?;
    }
    finish_count(acc.finish())
}

/// Reduce by draining the stream locally.
pub(crate) fn eager_reduce<S: Stream + ?Sized>(
    stream: &mut S,
    base: Option<&Datum>,
    f: &FuncExpr,
) -> TesseraResult<Datum> {
    let terminal = Terminal::Reduce { f: f.clone() };
    let mut acc = TerminalAccumulator::new(&terminal);
    while let Some(datum) = stream.next()? {
        acc.feed(&datum)?;
    }
    finish_reduce(acc.finish(), base, f)
}

/// Group-map-reduce by draining the stream locally.
pub(crate) fn eager_group_map_reduce<S: Stream + ?Sized>(
    stream: &mut S,
    group: &FuncExpr,
    map: &FuncExpr,
    base: Option<&Datum>,
    reduce: &FuncExpr,
) -> TesseraResult<Datum> {
    let terminal = Terminal::GroupMapReduce {
        group: group.clone(),
        map: map.clone(),
        reduce: reduce.clone(),
    };
    let mut acc = TerminalAccumulator::new(&terminal);
    while let Some(datum) = stream.next()? {
        acc.feed(&datum)?;
    }
    finish_group_map_reduce(acc.finish(), base, reduce)
}

/// A boxed stream, for heterogeneous collections such as `union` inputs.
pub type BoxStream = Box<dyn Stream>;

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        (**self).next()
    }

    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn next_batch(&mut self) -> TesseraResult<Vec<Datum>> {
        (**self).next_batch()
    }

    fn drain(&mut self) -> TesseraResult<Vec<Datum>> {
        (**self).drain()
    }

    fn count(&mut self) -> TesseraResult<Datum> {
        (**self).count()
    }

    fn reduce(&mut self, base: Option<&Datum>, f: &FuncExpr) -> TesseraResult<Datum> {
        (**self).reduce(base, f)
    }

    fn group_map_reduce(
        &mut self,
        group: &FuncExpr,
        map: &FuncExpr,
        base: Option<&Datum>,
        reduce: &FuncExpr,
    ) -> TesseraResult<Datum> {
        (**self).group_map_reduce(group, map, base, reduce)
    }
}
