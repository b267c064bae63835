//! Lazy remote streams.
//!
//! A lazy stream is a range read against a namespace that has not run
//! yet, carrying a stack of transformations. `map`, `filter`, and
//! `concat_map` append to the stack without fetching anything; pulling
//! an element issues the read for the next batch (a blocking point that
//! honours the interruptor); terminals lower to a server-side aggregation
//! shipped with the read, so only the aggregate crosses the wire.
//!
//! The resume cursor advances whole source keys at a time - the store
//! never splits one key's expansion across batches - so batching is
//! invisible to consumers.

use crate::core::error::{TesseraError, TesseraResult};
use crate::core::interrupt::Interruptor;
use crate::core::order::OrderToken;
use crate::kv::datum::Datum;
use crate::kv::query::{KvProtocol, KvRead, KvReadResponse, RangeRead};
use crate::kv::region::{key_successor, KeyRange};
use crate::namespace::facade::Namespace;
use crate::protocol::region::RegionLike;
use crate::stream::func::FuncExpr;
use crate::stream::transform::{
    finish_count, finish_group_map_reduce, finish_reduce, Terminal, TerminalResult, Transform,
};
use crate::stream::{eager_count, eager_group_map_reduce, eager_reduce, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

/// A stream backed by a namespace range read.
pub struct LazyStream {
    ns: Arc<Namespace<KvProtocol>>,
    range: KeyRange,
    transforms: Vec<Transform>,
    interruptor: Interruptor,
    batch_size: usize,
    buffer: VecDeque<Datum>,
    cursor: Vec<u8>,
    started: bool,
    exhausted: bool,
}

impl LazyStream {
    /// A stream over the values in `range`, in key order.
    pub fn new(ns: Arc<Namespace<KvProtocol>>, range: KeyRange, interruptor: Interruptor) -> Self {
        let batch_size = ns.config().max_batch_size;
        let cursor = range.start().to_vec();
        Self {
            ns,
            range,
            transforms: Vec::new(),
            interruptor,
            batch_size,
            buffer: VecDeque::new(),
            cursor,
            started: false,
            exhausted: false,
        }
    }

    /// Override the batch size, for exercising batch boundaries.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Push `map(f)` down into the read.
    pub fn map(mut self, f: FuncExpr) -> Self {
        self.transforms.push(Transform::Map(f));
        self
    }

    /// Push `filter(f)` down into the read.
    pub fn filter(mut self, f: FuncExpr) -> Self {
        self.transforms.push(Transform::Filter(f));
        self
    }

    /// Push `concat_map(f)` down into the read.
    pub fn concat_map(mut self, f: FuncExpr) -> Self {
        self.transforms.push(Transform::ConcatMap(f));
        self
    }

    /// The pushdown stack accumulated so far.
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    fn pristine(&self) -> bool {
        !self.started && self.buffer.is_empty()
    }

    fn remaining_range(&self) -> KeyRange {
        KeyRange::new(self.cursor.clone(), self.range.end().map(|e| e.to_vec()))
    }

    fn fetch(&mut self) -> TesseraResult<()> {
        self.interruptor.check()?;
        self.started = true;
        let remaining = self.remaining_range();
        if remaining.is_empty() {
            self.exhausted = true;
            return Ok(());
        }
        let read = KvRead::Range(RangeRead {
            range: remaining,
            transforms: self.transforms.clone(),
            terminal: None,
            limit: Some(self.batch_size),
        });
        let response = self
            .ns
            .read(read, OrderToken::unordered(), &self.interruptor)?;
        match response {
            KvReadResponse::Batch(rows) => {
                match rows.last() {
                    None => self.exhausted = true,
                    Some(last) => self.cursor = key_successor(&last.key),
                }
                self.buffer.extend(rows.into_iter().map(|row| row.datum));
                Ok(())
            }
            other => Err(TesseraError::invariant(format!(
                "range fetch produced {:?}",
                other
            ))),
        }
    }

    /// Ship a terminal with the read and return the merged result.
    fn run_terminal(&mut self, terminal: Terminal) -> TesseraResult<TerminalResult> {
        self.interruptor.check()?;
        let read = KvRead::Range(RangeRead {
            range: self.range.clone(),
            transforms: self.transforms.clone(),
            terminal: Some(terminal),
            limit: None,
        });
        self.started = true;
        self.exhausted = true;
        let response = self
            .ns
            .read(read, OrderToken::unordered(), &self.interruptor)?;
        match response {
            KvReadResponse::Terminal(result) => Ok(result),
            other => Err(TesseraError::invariant(format!(
                "terminal read produced {:?}",
                other
            ))),
        }
    }
}

impl Stream for LazyStream {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        loop {
            if let Some(datum) = self.buffer.pop_front() {
                return Ok(Some(datum));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch()?;
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn count(&mut self) -> TesseraResult<Datum> {
        if self.pristine() {
            let result = self.run_terminal(Terminal::Count)?;
            finish_count(result)
        } else {
            // Partially consumed: the remaining elements are already
            // local, finish eagerly.
            eager_count(self)
        }
    }

    fn reduce(&mut self, base: Option<&Datum>, f: &FuncExpr) -> TesseraResult<Datum> {
        if self.pristine() {
            let result = self.run_terminal(Terminal::Reduce { f: f.clone() })?;
            finish_reduce(result, base, f)
        } else {
            eager_reduce(self, base, f)
        }
    }

    fn group_map_reduce(
        &mut self,
        group: &FuncExpr,
        map: &FuncExpr,
        base: Option<&Datum>,
        reduce: &FuncExpr,
    ) -> TesseraResult<Datum> {
        if self.pristine() {
            let result = self.run_terminal(Terminal::GroupMapReduce {
                group: group.clone(),
                map: map.clone(),
                reduce: reduce.clone(),
            })?;
            finish_group_map_reduce(result, base, reduce)
        } else {
            eager_group_map_reduce(self, group, map, base, reduce)
        }
    }
}
