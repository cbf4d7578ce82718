// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Run loop driving one interpreter on its own tokio task.

use crate::async_callback::IslandEvent;
use crate::interpreter::GraphInterpreter;
use crate::logging::debug;
use futures::channel::mpsc::UnboundedReceiver;
use futures::{FutureExt, StreamExt};
use sluice_core::{CancellationToken, StreamError};

pub(crate) struct Island {
    interpreter: GraphInterpreter,
    mailbox: UnboundedReceiver<IslandEvent>,
    shutdown: CancellationToken,
}

impl Island {
    pub(crate) const fn new(
        interpreter: GraphInterpreter,
        mailbox: UnboundedReceiver<IslandEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            interpreter,
            mailbox,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "island {} started with {} stages",
            self.interpreter.island(),
            self.interpreter.stage_count()
        );
        self.interpreter.start();

        let limit = self.interpreter.event_limit().max(1);
        // Mailbox events handled since the last yield. A mailbox that is always
        // ready never suspends the select below, so the loop yields on its own.
        let mut handled = 0;

        while !self.interpreter.is_finished() {
            if self.shutdown.is_cancelled() {
                self.shut_down();
                break;
            }

            let more = self.interpreter.execute();
            if self.interpreter.is_finished() {
                break;
            }
            if more || handled >= limit {
                tokio::task::yield_now().await;
                handled = 0;
                if more {
                    // Pick up what arrived in the meantime without waiting for it.
                    for _ in 0..limit {
                        match self.mailbox.next().now_or_never() {
                            Some(Some(event)) => self.interpreter.handle_island_event(event),
                            _ => break,
                        }
                    }
                    continue;
                }
            }

            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => None,
                event = self.mailbox.next() => event,
            };
            match next {
                Some(event) => {
                    self.interpreter.handle_island_event(event);
                    handled += 1;
                }
                None => {
                    self.shut_down();
                    break;
                }
            }
        }

        debug!("island {} stopped", self.interpreter.island());
    }

    fn shut_down(&mut self) {
        self.interpreter
            .abort(StreamError::abrupt_termination("materializer shut down"));
    }
}
