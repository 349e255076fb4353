//! Line-delimited JSON over a reader and writer pair, handled by a fixed pool of workers.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::Duration;

use tracing::{debug, error};

use warden_core::RequestContext;

use crate::rpc::RpcDispatcher;

pub const DEFAULT_WORKERS: usize = 8;

/// Serve until `input` runs dry and return how many requests were answered.
///
/// At most `workers` requests run at once; reading stalls once as many more
/// are queued. Responses are written whole, in completion order.
pub fn serve<R, W>(
    dispatcher: &RpcDispatcher,
    input: R,
    output: W,
    workers: usize,
    timeout: Duration,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write + Send,
{
    let workers = workers.max(1);
    let (tx, rx) = sync_channel::<String>(workers);
    let rx = Mutex::new(rx);
    let output = Mutex::new(output);
    let answered = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| work(dispatcher, &rx, &output, &answered, timeout));
        }
        feed(input, tx)
    })?;

    Ok(answered.into_inner())
}

/// Dropping `tx` on return lets idle workers exit.
fn feed<R: BufRead>(input: R, tx: SyncSender<String>) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(line).is_err() {
            break;
        }
    }
    Ok(())
}

fn work<W: Write>(
    dispatcher: &RpcDispatcher,
    rx: &Mutex<Receiver<String>>,
    output: &Mutex<W>,
    answered: &AtomicUsize,
    timeout: Duration,
) {
    loop {
        let next = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return,
        };
        let Ok(line) = next else {
            debug!("request queue closed; worker exiting");
            return;
        };

        let ctx = RequestContext::with_timeout(timeout);
        let response = dispatcher.handle_line(&ctx, &line);
        answered.fetch_add(1, Ordering::Relaxed);

        let Ok(mut out) = output.lock() else {
            return;
        };
        if let Err(e) = writeln!(out, "{response}").and_then(|()| out.flush()) {
            error!(error = %e, "failed to write response");
        }
    }
}
