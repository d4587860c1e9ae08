use std::collections::BTreeMap;

use anyhow::Result;
use pretty_assertions::assert_eq;
use sluice_data_provider::{
    sort_mapping, Array, Config, ConstantScheme, DType, DataStream, DataStreamExt, DatasetStream,
    IndexableDataset, Merge, OnNonExistent, SequentialExampleScheme, SequentialScheme, SourceData,
    StreamError, Strictness,
};
use test_log::test;

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Examples 0..n of a single `numbers` source holding `i * 10`.
fn numbers(n: usize) -> DatasetStream<IndexableDataset> {
    let values: Vec<i64> = (0..n as i64).map(|i| i * 10).collect();
    let dataset =
        IndexableDataset::new([("numbers", SourceData::Array(Array::from_vec(values)))]).unwrap();
    DatasetStream::new(dataset, SequentialExampleScheme::new(n)).unwrap()
}

fn values(data: &SourceData) -> Vec<i64> {
    data.as_array().unwrap().to_vec::<i64>().unwrap()
}

fn drain_epoch(stream: &mut impl DataStream) -> Result<Vec<Vec<i64>>> {
    let mut out = Vec::new();
    for item in stream.get_epoch_iterator()? {
        out.push(values(&item?[0]));
    }
    Ok(out)
}

#[test]
fn batch_strictness_decides_the_last_batch() -> Result<()> {
    let mut lenient = numbers(5).batch(ConstantScheme::new(2)?, Strictness::Lenient)?;
    assert_eq!(
        drain_epoch(&mut lenient)?,
        vec![vec![0, 10], vec![20, 30], vec![40]]
    );

    let mut dropping = numbers(5).batch(ConstantScheme::new(2)?, Strictness::DropIncomplete)?;
    assert_eq!(drain_epoch(&mut dropping)?, vec![vec![0, 10], vec![20, 30]]);

    let mut strict = numbers(5).batch(ConstantScheme::new(2)?, Strictness::Strict)?;
    let results: Vec<_> = strict.get_epoch_iterator()?.collect();
    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[2],
        Err(StreamError::IncompleteBatch {
            requested: 2,
            provided: 1
        })
    ));

    let mut exact = numbers(4).batch(ConstantScheme::new(2)?, Strictness::Strict)?;
    assert_eq!(drain_epoch(&mut exact)?.len(), 2);
    Ok(())
}

#[test]
fn batch_needs_examples_and_batch_sizes() -> Result<()> {
    let batches = numbers(4).batch(ConstantScheme::new(2)?, Strictness::Lenient)?;
    assert!(batches
        .batch(ConstantScheme::new(2)?, Strictness::Lenient)
        .err()
        .unwrap()
        .is_config());
    assert!(numbers(4)
        .batch(SequentialExampleScheme::new(4), Strictness::Lenient)
        .err()
        .unwrap()
        .is_config());
    assert!(numbers(4).unpack().err().unwrap().is_config());
    Ok(())
}

#[test]
fn unpack_undoes_batch() -> Result<()> {
    for n in 0..9 {
        for batch_size in 1..5 {
            let mut stream = numbers(n)
                .batch(ConstantScheme::new(batch_size)?, Strictness::Lenient)?
                .unpack()?;
            assert!(stream.produces_examples());
            let expected: Vec<Vec<i64>> = (0..n as i64).map(|i| vec![i * 10]).collect();
            assert_eq!(drain_epoch(&mut stream)?, expected, "n={n} batch_size={batch_size}");

            // a second epoch starts from scratch
            assert_eq!(drain_epoch(&mut stream)?, expected, "n={n} batch_size={batch_size}");
        }
    }
    Ok(())
}

#[test]
fn unpack_restarts_mid_epoch() -> Result<()> {
    let mut stream = numbers(5)
        .batch(ConstantScheme::new(2)?, Strictness::Lenient)?
        .unpack()?;
    let first = stream.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(values(&first[0]), vec![0]);

    assert_eq!(
        drain_epoch(&mut stream)?,
        vec![vec![0], vec![10], vec![20], vec![30], vec![40]]
    );
    Ok(())
}

#[test]
fn cache_recuts_batches() -> Result<()> {
    let mut stream = numbers(6)
        .batch(ConstantScheme::new(5)?, Strictness::Lenient)?
        .cache(ConstantScheme::new(2)?)?;
    assert_eq!(
        drain_epoch(&mut stream)?,
        vec![vec![0, 10], vec![20, 30], vec![40, 50]]
    );

    assert!(numbers(6)
        .batch(ConstantScheme::new(5)?, Strictness::Lenient)?
        .cache(SequentialScheme::new(6, 2)?)
        .err()
        .unwrap()
        .is_config());
    Ok(())
}

#[test]
fn cache_restarts_mid_epoch() -> Result<()> {
    let mut stream = numbers(6)
        .batch(ConstantScheme::new(5)?, Strictness::Lenient)?
        .cache(ConstantScheme::new(2)?)?;
    let first = stream.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(values(&first[0]), vec![0, 10]);

    // leftovers of the abandoned epoch are not served again
    assert_eq!(
        drain_epoch(&mut stream)?,
        vec![vec![0, 10], vec![20, 30], vec![40, 50]]
    );
    Ok(())
}

#[test]
fn padding_through_a_pipeline() -> Result<()> {
    let rows = vec![vec![1i64, 2, 3], vec![4], vec![5, 6, 7, 8]];
    let dataset = IndexableDataset::new([(
        "features",
        SourceData::List(rows.into_iter().map(Array::from_vec).collect()),
    )])?;
    let mut stream = DatasetStream::new(dataset, SequentialExampleScheme::new(3))?
        .batch(ConstantScheme::new(3)?, Strictness::Lenient)?
        .padding(None, Some(DType::U8))?;
    assert_eq!(stream.sources(), &["features", "features_mask"]);

    let batch = stream.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(batch[0].as_array().unwrap().shape(), &[3, 4]);
    assert_eq!(
        batch[1].as_array().unwrap().to_vec::<u8>()?,
        vec![1, 1, 1, 0, 1, 0, 0, 0, 1, 1, 1, 1]
    );
    Ok(())
}

#[test]
fn float_defaults_come_from_the_config() -> Result<()> {
    let float_x = Config::load()?.float_x;
    let rows = vec![vec![1f32, 2.0], vec![3.0]];
    let dataset = IndexableDataset::new([(
        "features",
        SourceData::List(rows.into_iter().map(Array::from_vec).collect()),
    )])?;
    let mut stream = DatasetStream::new(dataset, SequentialScheme::new(2, 2)?)?
        .padding(None, None)?
        .force_float_x(None, Some(names(&["features"])))?;

    let batch = stream.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(batch[0].as_array().unwrap().dtype(), float_x);
    assert_eq!(batch[1].as_array().unwrap().dtype(), float_x);
    Ok(())
}

#[test]
fn padding_rejects_mismatched_trailing_axes() -> Result<()> {
    let rows = vec![
        Array::from_shape_vec(&[2, 3], vec![0f32; 6])?,
        Array::from_shape_vec(&[1, 2], vec![0f32; 2])?,
    ];
    let dataset = IndexableDataset::new([("features", SourceData::List(rows))])?;
    let mut stream = DatasetStream::new(dataset, SequentialScheme::new(2, 2)?)?
        .padding(None, Some(DType::F32))?;
    let first = stream.get_epoch_iterator()?.next().unwrap();
    assert!(matches!(first, Err(StreamError::InvalidRequest(_))));
    Ok(())
}

#[test]
fn merge_pulls_in_lockstep() -> Result<()> {
    let left = numbers(3).boxed();
    let right = numbers(2)
        .rename(
            BTreeMap::from([("numbers".to_owned(), "other".to_owned())]),
            OnNonExistent::Raise,
        )?
        .boxed();
    let mut merged = Merge::new(vec![left, right], names(&["a", "b"]))?;
    assert_eq!(merged.sources(), &["a", "b"]);

    let items: Vec<_> = merged.get_epoch_iterator()?.collect::<Result<_, _>>()?;
    assert_eq!(items.len(), 2);
    assert_eq!(values(&items[1][0]), vec![10]);
    assert_eq!(values(&items[1][1]), vec![10]);
    Ok(())
}

#[test]
fn merge_rejects_bad_source_counts_and_mixed_modes() -> Result<()> {
    let err = Merge::new(
        vec![numbers(2).boxed(), numbers(2).boxed()],
        names(&["s1", "s2", "s3"]),
    )
    .err()
    .unwrap();
    assert!(err.is_config());

    let batches = numbers(2)
        .batch(ConstantScheme::new(1)?, Strictness::Lenient)?
        .boxed();
    let err = Merge::new(vec![numbers(2).boxed(), batches], names(&["a", "b"]))
        .err()
        .unwrap();
    assert!(err.is_config());
    assert!(Merge::new(Vec::new(), Vec::new()).err().unwrap().is_config());
    Ok(())
}

fn pair() -> Result<Merge> {
    Ok(Merge::new(
        vec![numbers(2).boxed(), numbers(2).boxed()],
        names(&["x", "y"]),
    )?)
}

#[test]
fn rename_policies() -> Result<()> {
    let renamed = pair()?.rename(
        BTreeMap::from([("x".to_owned(), "features".to_owned())]),
        OnNonExistent::Raise,
    )?;
    assert_eq!(renamed.sources(), &["features", "y"]);

    let missing = BTreeMap::from([("z".to_owned(), "w".to_owned())]);
    assert!(pair()?
        .rename(missing.clone(), OnNonExistent::Raise)
        .err()
        .unwrap()
        .is_config());
    assert_eq!(
        pair()?.rename(missing.clone(), OnNonExistent::Ignore)?.sources(),
        &["x", "y"]
    );
    assert_eq!(
        pair()?.rename(missing, OnNonExistent::Warn)?.sources(),
        &["x", "y"]
    );

    let clash = BTreeMap::from([("x".to_owned(), "y".to_owned())]);
    assert!(pair()?
        .rename(clash, OnNonExistent::Raise)
        .err()
        .unwrap()
        .is_config());

    let swap = BTreeMap::from([
        ("x".to_owned(), "y".to_owned()),
        ("y".to_owned(), "x".to_owned()),
    ]);
    assert_eq!(
        pair()?.rename(swap, OnNonExistent::Raise)?.sources(),
        &["y", "x"]
    );

    let same_target = BTreeMap::from([
        ("x".to_owned(), "z".to_owned()),
        ("y".to_owned(), "z".to_owned()),
    ]);
    assert!(pair()?
        .rename(same_target, OnNonExistent::Raise)
        .err()
        .unwrap()
        .is_config());
    Ok(())
}

#[test]
fn filter_sources_keeps_stream_order() -> Result<()> {
    let three = Merge::new(
        vec![numbers(2).boxed(), numbers(2).boxed(), numbers(2).boxed()],
        names(&["a", "b", "c"]),
    )?;
    let mut projected = three.filter_sources(&names(&["c", "a"]))?;
    assert_eq!(projected.sources(), &["a", "c"]);
    let first = projected.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(first.len(), 2);

    assert!(pair()?
        .filter_sources(&names(&["nope"]))
        .err()
        .unwrap()
        .is_config());
    Ok(())
}

#[test]
fn filter_drops_rejected_examples() -> Result<()> {
    let mut odd_tens = numbers(6).filter(|example| values(&example[0])[0] % 20 != 0)?;
    assert_eq!(drain_epoch(&mut odd_tens)?, vec![vec![10], vec![30], vec![50]]);

    let batches = numbers(6).batch(ConstantScheme::new(2)?, Strictness::Lenient)?;
    assert!(batches.filter(|_| true).err().unwrap().is_config());
    Ok(())
}

#[test]
fn mapping_replaces_or_adds_sources() -> Result<()> {
    let mut doubled = numbers(3).mapping(
        |data| {
            let doubled = data[0].as_array().unwrap().scale_and_shift(2.0, 0.0);
            Ok(vec![SourceData::Array(doubled.cast(DType::I64))])
        },
        None,
    )?;
    assert_eq!(drain_epoch(&mut doubled)?, vec![vec![0], vec![20], vec![40]]);

    let mut widened = numbers(3).mapping(
        |data| Ok(vec![data[0].clone()]),
        Some(names(&["copy"])),
    )?;
    assert_eq!(widened.sources(), &["numbers", "copy"]);
    let first = widened.get_epoch_iterator()?.next().unwrap()?;
    assert_eq!(first[0], first[1]);

    let mut failing = numbers(3).mapping(|_| anyhow::bail!("no good"), None)?;
    let first = failing.get_epoch_iterator()?.next().unwrap();
    assert!(matches!(first, Err(StreamError::Mapping(_))));
    Ok(())
}

#[test]
fn sort_mapping_sorts_each_batch() -> Result<()> {
    let dataset = IndexableDataset::new([(
        "numbers",
        SourceData::Array(Array::from_vec(vec![3i64, 1, 2, 9, 7])),
    )])?;
    let mut stream = DatasetStream::new(dataset, SequentialScheme::new(5, 3)?)?.mapping(
        sort_mapping(
            |example: &[Array]| example[0].to_vec::<i64>().map(|v| v[0]).unwrap_or_default(),
            false,
        ),
        None,
    )?;
    assert_eq!(drain_epoch(&mut stream)?, vec![vec![1, 2, 3], vec![7, 9]]);
    Ok(())
}

#[test]
fn flatten_and_cast_chain() -> Result<()> {
    let images = Array::from_shape_vec(&[4, 2, 3], (0..24).collect::<Vec<i64>>())?;
    let dataset = IndexableDataset::new([("images", SourceData::Array(images))])?;
    let mut stream = DatasetStream::new(dataset, SequentialExampleScheme::new(4))?
        .flatten(None)?
        .cast(DType::F32, None)?;
    let first = stream.get_epoch_iterator()?.next().unwrap()?;
    let image = first[0].as_array().unwrap();
    assert_eq!(image.shape(), &[6]);
    assert_eq!(image.dtype(), DType::F32);
    Ok(())
}

#[test]
fn epoch_iterator_as_dict() -> Result<()> {
    let mut stream = pair()?;
    let items: Vec<_> = stream
        .get_epoch_iterator()?
        .as_dict()
        .collect::<Result<_, _>>()?;
    assert_eq!(items.len(), 2);
    assert_eq!(values(&items[1]["y"]), vec![10]);
    Ok(())
}

#[test]
fn pulling_before_an_epoch_is_an_error() -> Result<()> {
    let mut stream = numbers(2).batch(ConstantScheme::new(1)?, Strictness::Lenient)?;
    assert!(matches!(
        stream.get_data(Some(sluice_data_provider::Request::Size(1))),
        Err(StreamError::NoEpoch)
    ));
    Ok(())
}
