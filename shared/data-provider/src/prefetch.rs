use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter},
    stream::DataStream,
    transformers::reject_request,
    AxisLabels, Data,
};

enum Message {
    Data(Data),
    EndOfEpoch,
    Failed(StreamError),
}

/// Runs the wrapped stream on a background thread, keeping up to
/// `max_batches` items ready ahead of the consumer.
///
/// The worker loops over epochs on its own, marking the end of each with a
/// sentinel that turns into `Ok(None)` on this side. It stops once this
/// stream is closed or dropped, or after forwarding an error.
pub struct Prefetch {
    sources: Vec<String>,
    produces_examples: bool,
    axis_labels: Option<AxisLabels>,
    max_batches: usize,
    receiver: Option<Receiver<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl Prefetch {
    pub fn new<S: DataStream + 'static>(stream: S, max_batches: usize) -> Result<Self> {
        if max_batches == 0 {
            return Err(StreamError::config("max_batches must be at least 1"));
        }
        let sources = stream.sources().to_vec();
        let produces_examples = stream.produces_examples();
        let axis_labels = stream.axis_labels().cloned();

        let (sender, receiver) = bounded(max_batches);
        let worker = thread::Builder::new()
            .name("sluice-prefetch".to_owned())
            .spawn(move || produce(stream, sender))?;
        debug!(max_batches, "started prefetch worker");

        Ok(Self {
            sources,
            produces_examples,
            axis_labels,
            max_batches,
            receiver: Some(receiver),
            worker: Some(worker),
        })
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    fn shutdown(&mut self) {
        // the worker notices on its next send and exits
        drop(self.receiver.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("prefetch worker panicked");
            }
        }
    }
}

fn produce<S: DataStream>(mut stream: S, sender: Sender<Message>) {
    let mut epoch = 0u64;
    loop {
        let iterator = match stream.get_epoch_iterator() {
            Ok(iterator) => iterator,
            Err(err) => {
                let _ = sender.send(Message::Failed(err));
                return;
            }
        };
        for item in iterator {
            let (message, failed) = match item {
                Ok(data) => (Message::Data(data), false),
                Err(err) => (Message::Failed(err), true),
            };
            if sender.send(message).is_err() {
                trace!("prefetch consumer gone, stopping");
                return;
            }
            if failed {
                return;
            }
        }
        if sender.send(Message::EndOfEpoch).is_err() {
            trace!("prefetch consumer gone, stopping");
            return;
        }
        epoch += 1;
        trace!(epoch, "prefetched epoch");
    }
}

impl DataStream for Prefetch {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn produces_examples(&self) -> bool {
        self.produces_examples
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        Ok(None)
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        reject_request(request)?;
        let receiver = self
            .receiver
            .as_ref()
            .ok_or(StreamError::WorkerDisconnected)?;
        match receiver.recv() {
            Ok(Message::Data(data)) => Ok(Some(data)),
            Ok(Message::EndOfEpoch) => Ok(None),
            Ok(Message::Failed(err)) => Err(err),
            Err(_) => Err(StreamError::WorkerDisconnected),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.shutdown();
    }
}
