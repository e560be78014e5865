//! Message transport between a training coordinator and its workers.
//!
//! Every exchange is blocking and in order. There are no timeouts: a peer
//! that stops responding stalls the other side until its link closes.

use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::candidate::ScoredCandidate;
use crate::error::RfError;

/// Messages from the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ToWorker {
    /// Draw the batch for tree `tree_index` from the local replica.
    BeginTree {
        /// Position of the tree in the forest.
        tree_index: usize,
        /// Seed for the batch draw.
        batch_seed: u64,
    },
    /// Search the node occupying `start..end` of the batch.
    Search {
        /// First batch position of the node.
        start: usize,
        /// One past the last batch position of the node.
        end: usize,
        /// Seed shared by every participant for this node.
        node_seed: u64,
    },
    /// Partition the node last searched with the winning candidate, if any.
    Apply {
        /// The reduced winner.
        best: Option<ScoredCandidate>,
    },
    /// The current tree is complete.
    TreeDone,
    /// Training is over; the worker should exit.
    Shutdown,
}

/// Messages from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ToCoordinator {
    /// The batch for the current tree is drawn.
    Ready {
        /// Size of the drawn batch.
        n_samples: usize,
    },
    /// The worker's best candidate for the node last searched.
    Proposal {
        /// `None` when no candidate in the worker's share had positive gain.
        best: Option<ScoredCandidate>,
    },
}

/// One end of a bidirectional, ordered message link.
pub trait Link<Out, In> {
    /// Rank of the participant at the other end.
    fn peer(&self) -> usize;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LinkClosed`] when the peer is gone and
    /// [`RfError::LinkIo`] for encoding or transport failures.
    fn send(&mut self, message: Out) -> Result<(), RfError>;

    /// Block until the next message arrives.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::LinkClosed`] when the peer is gone and
    /// [`RfError::LinkIo`] for decoding or transport failures.
    fn recv(&mut self) -> Result<In, RfError>;
}

/// In-process link over a pair of channels.
#[derive(Debug)]
pub struct ChannelLink<Out, In> {
    peer: usize,
    tx: Sender<Out>,
    rx: Receiver<In>,
}

/// Create both ends of an in-process link.
///
/// The first end talks to participant `right_rank`, the second to `left_rank`.
#[must_use]
pub fn channel_pair<A, B>(left_rank: usize, right_rank: usize) -> (ChannelLink<A, B>, ChannelLink<B, A>) {
    let (tx_a, rx_a) = mpsc::channel();
    let (tx_b, rx_b) = mpsc::channel();
    (
        ChannelLink {
            peer: right_rank,
            tx: tx_a,
            rx: rx_b,
        },
        ChannelLink {
            peer: left_rank,
            tx: tx_b,
            rx: rx_a,
        },
    )
}

impl<Out, In> Link<Out, In> for ChannelLink<Out, In> {
    fn peer(&self) -> usize {
        self.peer
    }

    fn send(&mut self, message: Out) -> Result<(), RfError> {
        self.tx
            .send(message)
            .map_err(|_| RfError::LinkClosed { rank: self.peer })
    }

    fn recv(&mut self) -> Result<In, RfError> {
        self.rx
            .recv()
            .map_err(|_| RfError::LinkClosed { rank: self.peer })
    }
}

/// Link over a byte stream such as a `TcpStream`, one bincode frame per message.
#[derive(Debug)]
pub struct StreamLink<T, Out, In> {
    peer: usize,
    stream: T,
    _messages: PhantomData<fn(Out) -> In>,
}

impl<T: Read + Write, Out, In> StreamLink<T, Out, In> {
    /// Wrap `stream`, whose other end is participant `peer`.
    #[must_use]
    pub fn new(peer: usize, stream: T) -> Self {
        Self {
            peer,
            stream,
            _messages: PhantomData,
        }
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> T {
        self.stream
    }

    fn link_error(&self, e: Box<bincode::ErrorKind>) -> RfError {
        let closed = matches!(
            &*e,
            bincode::ErrorKind::Io(err) if matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            )
        );
        if closed {
            RfError::LinkClosed { rank: self.peer }
        } else {
            RfError::LinkIo {
                rank: self.peer,
                source: e,
            }
        }
    }
}

impl<T, Out, In> Link<Out, In> for StreamLink<T, Out, In>
where
    T: Read + Write,
    Out: serde::Serialize,
    In: serde::de::DeserializeOwned,
{
    fn peer(&self) -> usize {
        self.peer
    }

    fn send(&mut self, message: Out) -> Result<(), RfError> {
        let frame = bincode::serialize(&message).map_err(|e| self.link_error(e))?;
        self.stream
            .write_all(&frame)
            .and_then(|()| self.stream.flush())
            .map_err(|e| self.link_error(Box::new(bincode::ErrorKind::Io(e))))
    }

    fn recv(&mut self) -> Result<In, RfError> {
        bincode::deserialize_from(&mut self.stream).map_err(|e| self.link_error(e))
    }
}
