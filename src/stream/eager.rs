//! Eager streams and the wrapper operators.
//!
//! An eager stream is backed by an in-memory collection; its operators
//! evaluate on demand as elements are pulled. The wrappers here also
//! apply to lazy streams for the operators that cannot be pushed down
//! (`slice`, `zip`, `union`), consuming the inner stream and delegating
//! its batch size.

use crate::core::error::{TesseraError, TesseraResult};
use crate::kv::datum::Datum;
use crate::stream::func::FuncExpr;
use crate::stream::{BoxStream, Stream};

/// A stream over an in-memory array of datums.
#[derive(Debug)]
pub struct ArrayStream {
    items: std::vec::IntoIter<Datum>,
}

impl ArrayStream {
    /// Stream the elements of `items` in order.
    pub fn from_vec(items: Vec<Datum>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }

    /// Stream the elements of an array datum.
    pub fn from_datum(datum: Datum) -> TesseraResult<Self> {
        match datum {
            Datum::Arr(items) => Ok(Self::from_vec(items)),
            other => Err(TesseraError::user_query(format!(
                "Cannot stream {} as a sequence.",
                other.type_name()
            ))),
        }
    }
}

impl Stream for ArrayStream {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        Ok(self.items.next())
    }
}

/// Elementwise `f` over an upstream.
pub struct MapStream<S> {
    src: S,
    f: FuncExpr,
}

impl<S: Stream> Stream for MapStream<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        match self.src.next()? {
            None => Ok(None),
            Some(datum) => Ok(Some(self.f.call1(&datum)?)),
        }
    }

    fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// Keep upstream elements for which `f` is truthy.
pub struct FilterStream<S> {
    src: S,
    f: FuncExpr,
}

impl<S: Stream> Stream for FilterStream<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        loop {
            match self.src.next()? {
                None => return Ok(None),
                Some(datum) => {
                    if self.f.call1(&datum)?.is_truthy() {
                        return Ok(Some(datum));
                    }
                }
            }
        }
    }

    fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// Expand each upstream element into the elements of `f(element)`,
/// flattened in order.
pub struct ConcatMapStream<S> {
    src: S,
    f: FuncExpr,
    sub: Option<std::vec::IntoIter<Datum>>,
}

impl<S: Stream> Stream for ConcatMapStream<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        loop {
            if let Some(sub) = &mut self.sub {
                if let Some(datum) = sub.next() {
                    return Ok(Some(datum));
                }
                self.sub = None;
            }
            match self.src.next()? {
                None => return Ok(None),
                Some(datum) => {
                    let expanded = self.f.call1(&datum)?;
                    self.sub = Some(expanded.as_arr()?.to_vec().into_iter());
                }
            }
        }
    }

    fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// Skip `left` elements, then deliver at most `right - left`.
pub struct SliceStream<S> {
    src: S,
    index: usize,
    left: usize,
    right: usize,
}

impl<S: Stream> Stream for SliceStream<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        if self.left >= self.right {
            return Ok(None);
        }
        while self.index < self.left {
            if self.src.next()?.is_none() {
                return Ok(None);
            }
            self.index += 1;
        }
        if self.index >= self.right {
            return Ok(None);
        }
        match self.src.next()? {
            None => Ok(None),
            Some(datum) => {
                self.index += 1;
                Ok(Some(datum))
            }
        }
    }

    fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// Interpret each element as a join row `{left, right}` and merge the
/// right document over the left.
pub struct ZipStream<S> {
    src: S,
}

impl<S: Stream> Stream for ZipStream<S> {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        match self.src.next()? {
            None => Ok(None),
            Some(datum) => {
                let left = datum.get("left").cloned().ok_or_else(|| {
                    TesseraError::user_query("ZIP can only be called on the result of a join.")
                })?;
                match datum.get("right") {
                    Some(right) => Ok(Some(left.merge(right)?)),
                    None => Ok(Some(left)),
                }
            }
        }
    }

    fn batch_size(&self) -> usize {
        self.src.batch_size()
    }
}

/// Concatenation of several streams, in argument order.
pub struct UnionStream {
    streams: Vec<BoxStream>,
    index: usize,
}

impl Stream for UnionStream {
    fn next(&mut self) -> TesseraResult<Option<Datum>> {
        while self.index < self.streams.len() {
            if let Some(datum) = self.streams[self.index].next()? {
                return Ok(Some(datum));
            }
            self.index += 1;
        }
        Ok(None)
    }
}

/// Concatenate `streams`, delivering each one's elements in argument
/// order.
pub fn union(streams: Vec<BoxStream>) -> UnionStream {
    UnionStream { streams, index: 0 }
}

/// Stream-consuming operator constructors.
pub trait StreamExt: Stream + Sized {
    /// Replace each element with `f(element)`.
    fn map(self, f: FuncExpr) -> MapStream<Self> {
        MapStream { src: self, f }
    }

    /// Keep elements for which `f(element)` is truthy.
    fn filter(self, f: FuncExpr) -> FilterStream<Self> {
        FilterStream { src: self, f }
    }

    /// Expand each element into the array `f(element)`, flattened.
    fn concat_map(self, f: FuncExpr) -> ConcatMapStream<Self> {
        ConcatMapStream {
            src: self,
            f,
            sub: None,
        }
    }

    /// Skip `left` elements, then deliver at most `right - left`.
    /// Out-of-range or inverted bounds yield an empty stream.
    fn slice(self, left: usize, right: usize) -> SliceStream<Self> {
        SliceStream {
            src: self,
            index: 0,
            left,
            right,
        }
    }

    /// Merge join rows; fails on elements without a `left` document.
    fn zip(self) -> ZipStream<Self> {
        ZipStream { src: self }
    }

    /// Box the stream for heterogeneous collections.
    fn boxed(self) -> BoxStream
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<S: Stream + Sized> StreamExt for S {}
