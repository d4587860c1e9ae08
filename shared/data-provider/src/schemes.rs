use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use sluice_core::Shuffle;

use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter, RequestKind},
};

/// Produces the requests that drive one epoch. Every call to
/// [`IterationScheme::get_request_iterator`] starts a fresh epoch.
pub trait IterationScheme: Send {
    fn request_kind(&self) -> RequestKind;

    fn requests_examples(&self) -> bool {
        self.request_kind().requests_examples()
    }

    fn get_request_iterator(&mut self) -> RequestIter;
}

impl<S: IterationScheme + ?Sized> IterationScheme for Box<S> {
    fn request_kind(&self) -> RequestKind {
        (**self).request_kind()
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        (**self).get_request_iterator()
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(StreamError::config("batch size must be positive"));
    }
    Ok(())
}

/// Requests batches of a constant size. With `num_examples` the last request
/// is the remainder; with `times` exactly that many requests are made;
/// otherwise requests never end and exhaustion comes from upstream.
#[derive(Debug, Clone)]
pub struct ConstantScheme {
    batch_size: usize,
    num_examples: Option<usize>,
    times: Option<usize>,
}

impl ConstantScheme {
    pub fn new(batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            batch_size,
            num_examples: None,
            times: None,
        })
    }

    pub fn with_num_examples(mut self, num_examples: usize) -> Self {
        self.num_examples = Some(num_examples);
        self
    }

    pub fn with_times(mut self, times: usize) -> Self {
        self.times = Some(times);
        self
    }
}

impl IterationScheme for ConstantScheme {
    fn request_kind(&self) -> RequestKind {
        RequestKind::BatchSize
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        let size = self.batch_size;
        let constant = std::iter::repeat(Request::Size(size));
        match (self.num_examples, self.times) {
            (Some(num_examples), _) => {
                let remainder = num_examples % size;
                Box::new(
                    constant
                        .take(num_examples / size)
                        .chain((remainder > 0).then_some(Request::Size(remainder))),
                )
            }
            (None, Some(times)) => Box::new(constant.take(times)),
            (None, None) => Box::new(constant),
        }
    }
}

/// Contiguous slices, in order.
#[derive(Debug, Clone)]
pub struct SequentialScheme {
    num_examples: usize,
    batch_size: usize,
}

impl SequentialScheme {
    pub fn new(num_examples: usize, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            num_examples,
            batch_size,
        })
    }
}

impl IterationScheme for SequentialScheme {
    fn request_kind(&self) -> RequestKind {
        RequestKind::Batch
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        let (n, size) = (self.num_examples, self.batch_size);
        Box::new(
            (0..n)
                .step_by(size)
                .map(move |start| Request::Slice(start..(start + size).min(n))),
        )
    }
}

/// Index lists drawn from a permutation that is reshuffled every epoch.
/// The rng carries over between epochs, so a seeded scheme gives a
/// different but reproducible order each epoch.
#[derive(Debug, Clone)]
pub struct ShuffledScheme {
    num_examples: usize,
    batch_size: usize,
    rng: Option<ChaCha8Rng>,
    sorted_indices: bool,
}

impl ShuffledScheme {
    pub fn new(num_examples: usize, batch_size: usize, shuffle: Shuffle) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            num_examples,
            batch_size,
            rng: shuffle.rng(),
            sorted_indices: false,
        })
    }

    /// Sort the indices inside each batch, which makes reads from file
    /// backed storage cheaper while keeping batch membership random.
    pub fn with_sorted_indices(mut self, sorted_indices: bool) -> Self {
        self.sorted_indices = sorted_indices;
        self
    }
}

impl IterationScheme for ShuffledScheme {
    fn request_kind(&self) -> RequestKind {
        RequestKind::Batch
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        let mut indices: Vec<usize> = (0..self.num_examples).collect();
        if let Some(rng) = self.rng.as_mut() {
            indices.shuffle(rng);
        }
        let sorted = self.sorted_indices;
        let requests: Vec<Request> = indices
            .chunks(self.batch_size)
            .map(|chunk| {
                let mut chunk = chunk.to_vec();
                if sorted {
                    chunk.sort_unstable();
                }
                Request::Indices(chunk)
            })
            .collect();
        Box::new(requests.into_iter())
    }
}

#[derive(Debug, Clone)]
pub struct SequentialExampleScheme {
    num_examples: usize,
}

impl SequentialExampleScheme {
    pub fn new(num_examples: usize) -> Self {
        Self { num_examples }
    }
}

impl IterationScheme for SequentialExampleScheme {
    fn request_kind(&self) -> RequestKind {
        RequestKind::Example
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        Box::new((0..self.num_examples).map(Request::Index))
    }
}

#[derive(Debug, Clone)]
pub struct ShuffledExampleScheme {
    num_examples: usize,
    rng: Option<ChaCha8Rng>,
}

impl ShuffledExampleScheme {
    pub fn new(num_examples: usize, shuffle: Shuffle) -> Self {
        Self {
            num_examples,
            rng: shuffle.rng(),
        }
    }
}

impl IterationScheme for ShuffledExampleScheme {
    fn request_kind(&self) -> RequestKind {
        RequestKind::Example
    }

    fn get_request_iterator(&mut self) -> RequestIter {
        let mut indices: Vec<usize> = (0..self.num_examples).collect();
        if let Some(rng) = self.rng.as_mut() {
            indices.shuffle(rng);
        }
        Box::new(indices.into_iter().map(Request::Index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(scheme: &mut impl IterationScheme) -> Vec<usize> {
        scheme
            .get_request_iterator()
            .map(|r| match r {
                Request::Size(n) => n,
                other => panic!("unexpected request {other:?}"),
            })
            .collect()
    }

    #[test]
    fn constant_scheme_emits_remainder() {
        let mut scheme = ConstantScheme::new(4).unwrap().with_num_examples(10);
        assert_eq!(sizes(&mut scheme), vec![4, 4, 2]);
        let mut scheme = ConstantScheme::new(3).unwrap().with_times(2);
        assert_eq!(sizes(&mut scheme), vec![3, 3]);
        assert!(ConstantScheme::new(0).is_err());
    }

    #[test]
    fn sequential_scheme_covers_everything_once() {
        let mut scheme = SequentialScheme::new(7, 3).unwrap();
        let requests: Vec<_> = scheme.get_request_iterator().collect();
        assert_eq!(
            requests,
            vec![
                Request::Slice(0..3),
                Request::Slice(3..6),
                Request::Slice(6..7)
            ]
        );
        assert!(!scheme.requests_examples());
    }

    #[test]
    fn shuffled_scheme_is_a_reproducible_permutation() {
        let shuffle = Shuffle::from_u64(7);
        let mut a = ShuffledScheme::new(20, 6, shuffle).unwrap();
        let mut b = ShuffledScheme::new(20, 6, shuffle).unwrap();
        let first: Vec<_> = a.get_request_iterator().collect();
        assert_eq!(first, b.get_request_iterator().collect::<Vec<_>>());

        let mut seen: Vec<usize> = first
            .iter()
            .flat_map(|r| match r {
                Request::Indices(i) => i.clone(),
                other => panic!("unexpected request {other:?}"),
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());

        let second: Vec<_> = a.get_request_iterator().collect();
        assert_ne!(first, second);
    }

    #[test]
    fn sorted_indices_are_sorted_within_batches() {
        let mut scheme = ShuffledScheme::new(12, 4, Shuffle::from_u64(3))
            .unwrap()
            .with_sorted_indices(true);
        for request in scheme.get_request_iterator() {
            let Request::Indices(indices) = request else {
                panic!("expected indices");
            };
            assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn example_schemes_request_examples() {
        let mut scheme = SequentialExampleScheme::new(3);
        assert!(scheme.requests_examples());
        assert_eq!(
            scheme.get_request_iterator().collect::<Vec<_>>(),
            vec![Request::Index(0), Request::Index(1), Request::Index(2)]
        );
        let mut unshuffled = ShuffledExampleScheme::new(3, Shuffle::DontShuffle);
        assert_eq!(unshuffled.get_request_iterator().count(), 3);
    }
}
