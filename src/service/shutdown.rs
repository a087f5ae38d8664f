// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

/// The server's view of the hub's stop broadcast.
///
/// A dropped or lagging sender counts as a stop signal too. Once observed,
/// the signal sticks: later checks return at once.
#[derive(Debug)]
pub struct Shutdown {
    stopped: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            stopped: false,
            notify,
        }
    }

    /// Subscribes to `sender`. Only broadcasts sent after this call count.
    pub fn subscribe(sender: &broadcast::Sender<()>) -> Shutdown {
        Shutdown::new(sender.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped
    }

    /// Checks for a stop signal without waiting.
    ///
    /// Used between multiplexer cycles so a cycle never starts after the stop
    /// was broadcast, even when the tick and the signal are ready together.
    pub fn try_observe(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        match self.notify.try_recv() {
            Err(TryRecvError::Empty) => false,
            Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => {
                debug!("stop signal observed between cycles");
                self.stopped = true;
                true
            }
        }
    }

    /// Waits for the stop signal.
    pub async fn recv(&mut self) {
        if self.stopped {
            return;
        }
        let _ = self.notify.recv().await;
        self.stopped = true;
    }
}
