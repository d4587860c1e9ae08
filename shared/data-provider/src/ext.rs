use std::collections::BTreeMap;

use sluice_core::DType;

use crate::{
    config::Config,
    error::Result,
    prefetch::Prefetch,
    schemes::IterationScheme,
    stream::DataStream,
    transformers::{
        Batch, Cache, Cast, FilterSources, Filter, Flatten, ForceFloatX, Mapping, OnNonExistent,
        Padding, Pipe, Rename, ScaleAndShift, Sourcewise, Strictness, Unpack,
    },
    Data,
};

/// Builder-style wrappers, so pipelines read top to bottom:
///
/// ```ignore
/// let stream = DatasetStream::new(dataset, SequentialExampleScheme::new(n))?
///     .batch(ConstantScheme::new(32)?, Strictness::Lenient)?
///     .padding(None, Some(DType::F32))?
///     .prefetch(None)?;
/// ```
///
/// Arguments taken as `Option` fall back to the loaded [`Config`] when `None`.
pub trait DataStreamExt: DataStream + Sized {
    fn flatten(
        self,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<Self, Sourcewise<Flatten>>> {
        Flatten::new(self, which_sources)
    }

    fn scale_and_shift(
        self,
        scale: f64,
        shift: f64,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<Self, Sourcewise<ScaleAndShift>>> {
        ScaleAndShift::new(self, scale, shift, which_sources)
    }

    fn cast(
        self,
        dtype: DType,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<Self, Sourcewise<Cast>>> {
        Cast::new(self, dtype, which_sources)
    }

    fn force_float_x(
        self,
        float_x: Option<DType>,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<Self, Sourcewise<ForceFloatX>>> {
        let float_x = match float_x {
            Some(float_x) => float_x,
            None => Config::for_defaults()?.float_x,
        };
        ForceFloatX::new(self, float_x, which_sources)
    }

    fn filter<P>(self, predicate: P) -> Result<Filter<Self, P>>
    where
        P: FnMut(&Data) -> bool + Send,
    {
        Filter::new(self, predicate)
    }

    fn batch(
        self,
        scheme: impl IterationScheme + 'static,
        strictness: Strictness,
    ) -> Result<Batch<Self>> {
        Batch::new(self, scheme, strictness)
    }

    fn unpack(self) -> Result<Unpack<Self>> {
        Unpack::new(self)
    }

    fn cache(self, scheme: impl IterationScheme + 'static) -> Result<Cache<Self>> {
        Cache::new(self, scheme)
    }

    fn padding(
        self,
        mask_sources: Option<Vec<String>>,
        mask_dtype: Option<DType>,
    ) -> Result<Pipe<Self, Padding>> {
        let mask_dtype = match mask_dtype {
            Some(dtype) => dtype,
            None => Config::for_defaults()?.float_x,
        };
        Padding::new(self, mask_sources, mask_dtype)
    }

    fn rename(
        self,
        names: BTreeMap<String, String>,
        on_non_existent: OnNonExistent,
    ) -> Result<Pipe<Self, Rename>> {
        Rename::new(self, names, on_non_existent)
    }

    fn filter_sources(self, sources: &[String]) -> Result<Pipe<Self, FilterSources>> {
        FilterSources::new(self, sources)
    }

    fn mapping<F>(
        self,
        mapping: F,
        add_sources: Option<Vec<String>>,
    ) -> Result<Pipe<Self, Mapping<F>>>
    where
        F: FnMut(Data) -> anyhow::Result<Data> + Send,
    {
        Mapping::new(self, mapping, add_sources)
    }

    fn prefetch(self, max_batches: Option<usize>) -> Result<Prefetch>
    where
        Self: 'static,
    {
        let max_batches = match max_batches {
            Some(max_batches) => max_batches,
            None => Config::for_defaults()?.prefetch_max_batches,
        };
        Prefetch::new(self, max_batches)
    }

    fn boxed(self) -> Box<dyn DataStream>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<S: DataStream> DataStreamExt for S {}
