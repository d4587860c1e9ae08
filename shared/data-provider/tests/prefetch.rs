use anyhow::Result;
use pretty_assertions::assert_eq;
use sluice_data_provider::{
    Array, Config, ConstantScheme, DataStream, DataStreamExt, DatasetStream, IndexableDataset,
    Request, SequentialExampleScheme, SourceData, StreamError, Strictness,
};
use test_log::test;

fn batches(n: usize, batch_size: usize, strictness: Strictness) -> Result<impl DataStream> {
    let values: Vec<i64> = (0..n as i64).collect();
    let dataset = IndexableDataset::new([("numbers", SourceData::Array(Array::from_vec(values)))])?;
    Ok(DatasetStream::new(dataset, SequentialExampleScheme::new(n))?
        .batch(ConstantScheme::new(batch_size)?, strictness)?)
}

fn epoch(stream: &mut impl DataStream) -> Result<Vec<Vec<i64>>> {
    stream
        .get_epoch_iterator()?
        .map(|batch| Ok(batch?[0].as_array().unwrap().to_vec::<i64>()?))
        .collect()
}

#[test]
fn prefetched_epochs_match_the_wrapped_stream() -> Result<()> {
    let mut direct = batches(7, 3, Strictness::Lenient)?;
    let expected = epoch(&mut direct)?;

    let mut prefetched = batches(7, 3, Strictness::Lenient)?.prefetch(Some(2))?;
    assert!(!prefetched.produces_examples());
    assert_eq!(prefetched.sources(), &["numbers"]);
    for _ in 0..3 {
        assert_eq!(epoch(&mut prefetched)?, expected);
    }
    Ok(())
}

#[test]
fn capacity_defaults_to_the_configured_size() -> Result<()> {
    let mut prefetched = batches(7, 3, Strictness::Lenient)?.prefetch(None)?;
    assert_eq!(prefetched.max_batches(), Config::load()?.prefetch_max_batches);
    assert_eq!(epoch(&mut prefetched)?, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    Ok(())
}

#[test]
fn errors_cross_the_thread_boundary() -> Result<()> {
    let mut prefetched = batches(5, 2, Strictness::Strict)?.prefetch(Some(1))?;
    let results: Vec<_> = prefetched.get_epoch_iterator()?.collect();
    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[2],
        Err(StreamError::IncompleteBatch { .. })
    ));

    // the worker stops after forwarding a failure
    assert!(matches!(
        prefetched.get_data(None),
        Err(StreamError::WorkerDisconnected)
    ));
    Ok(())
}

#[test]
fn prefetch_takes_no_requests_and_needs_capacity() -> Result<()> {
    assert!(batches(4, 2, Strictness::Lenient)?
        .prefetch(Some(0))
        .err()
        .unwrap()
        .is_config());

    let mut prefetched = batches(4, 2, Strictness::Lenient)?.prefetch(Some(4))?;
    assert!(matches!(
        prefetched.get_data(Some(Request::Size(2))),
        Err(StreamError::InvalidRequest(_))
    ));
    prefetched.close()?;
    assert!(matches!(
        prefetched.get_data(None),
        Err(StreamError::WorkerDisconnected)
    ));
    Ok(())
}
