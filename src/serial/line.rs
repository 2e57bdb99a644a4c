use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::TransportError;
use super::COMMAND_TERMINATOR;

//largest TX reply for a fully populated tracker is well under 2k
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Accumulates bytes until a carriage return and hands the line out as an owned `String`.
///
/// A read that times out part way through a line, or overflows, leaves the
/// rest of that line in flight. The reader then drops everything up to the
/// next terminator so the following reply lines up with its command.
pub struct LineReader{
    buffer: Vec<u8>,
    capacity: usize,
    resync: bool,
}

impl LineReader{
    pub fn new(capacity: usize) -> Self{
        LineReader{
            buffer: Vec::with_capacity(capacity),
            capacity,
            resync: false,
        }
    }

    pub fn clear(&mut self){
        self.buffer.clear();
        self.resync = false;
    }

    /// True while the tail of an abandoned line is still being discarded.
    pub fn is_resyncing(&self) -> bool{
        self.resync
    }

    pub fn pending(&self) -> usize{
        self.buffer.len()
    }

    /// Reads from `source` until a terminator arrives.
    ///
    /// Read timeouts from `source` are treated as poll ticks: `closed` is
    /// checked on every tick, and `timeout` (if any) bounds the total wait.
    pub fn read_line<R: Read + ?Sized>(
        &mut self,
        source: &mut R,
        closed: &AtomicBool,
        timeout: Option<Duration>,
    ) -> Result<String, TransportError>{
        let started = Instant::now();
        let mut chunk = [0u8; 256];

        loop{
            if let Some(line) = self.take_line(){
                return Ok(line);
            }
            if self.buffer.len() >= self.capacity{
                self.buffer.clear();
                if !self.resync{
                    self.resync = true;
                    return Err(TransportError::Overflow{ capacity: self.capacity });
                }
            }
            if closed.load(Ordering::SeqCst){
                return Err(TransportError::Closed);
            }

            let room = (self.capacity - self.buffer.len()).min(chunk.len());
            match source.read(&mut chunk[..room]){
                Ok(0) =>{
                    return Err(TransportError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "device closed the line",
                    )));
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(ref e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) =>{
                    if let Some(limit) = timeout{
                        if started.elapsed() >= limit{
                            //only a partial line proves a reply is still in flight
                            self.resync |= !self.buffer.is_empty();
                            self.buffer.clear();
                            return Err(TransportError::TimedOut(limit.as_millis() as u64));
                        }
                    }
                }
                Err(e) => return Err(TransportError::Read(e)),
            }
        }
    }

    fn take_line(&mut self) -> Option<String>{
        loop{
            let end = self.buffer.iter().position(|&b| b == COMMAND_TERMINATOR)?;
            if self.resync{
                self.buffer.drain(..=end);
                self.resync = false;
                continue;
            }
            let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.drain(..=end);
            return Some(line);
        }
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;

    //hands out one scripted chunk per read, then times out forever
    struct ChunkedSource{
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkedSource{
        fn new(chunks: &[&str]) -> Self{
            ChunkedSource{ chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect() }
        }

        fn feed(&mut self, chunk: &str){
            self.chunks.push_back(chunk.as_bytes().to_vec());
        }
    }

    impl Read for ChunkedSource{
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>{
            match self.chunks.pop_front(){
                Some(chunk) =>{
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len(){
                        self.chunks.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None =>{
                    thread::sleep(Duration::from_millis(5));
                    Err(io::Error::new(io::ErrorKind::TimedOut, "poll"))
                }
            }
        }
    }

    #[test]
    fn test_line_split_across_reads(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["OKA", "YA8", "96\r"]);
        let open = AtomicBool::new(false);
        let line = reader.read_line(&mut source, &open, None).unwrap();
        assert_eq!(line, "OKAYA896");
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_bytes_after_terminator_are_kept(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["OKAY\r00\r"]);
        let open = AtomicBool::new(false);
        assert_eq!(reader.read_line(&mut source, &open, None).unwrap(), "OKAY");
        assert_eq!(reader.read_line(&mut source, &open, None).unwrap(), "00");
    }

    #[test]
    fn test_line_feeds_stay_inside_the_line(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["0201MISSING\n0000\r"]);
        let open = AtomicBool::new(false);
        let line = reader.read_line(&mut source, &open, None).unwrap();
        assert_eq!(line, "0201MISSING\n0000");
    }

    #[test]
    fn test_overflow_is_an_error(){
        let mut reader = LineReader::new(8);
        let mut source = ChunkedSource::new(&["0123456789ABCDEF\r"]);
        let open = AtomicBool::new(false);
        let result = reader.read_line(&mut source, &open, None);
        assert!(matches!(result, Err(TransportError::Overflow{ capacity: 8 })));
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_overflowed_line_tail_is_dropped(){
        let mut reader = LineReader::new(8);
        let mut source = ChunkedSource::new(&["0123456789ABCDEFGHIJ\rOKAY\r"]);
        let open = AtomicBool::new(false);
        assert!(matches!(
            reader.read_line(&mut source, &open, None),
            Err(TransportError::Overflow{ capacity: 8 })
        ));
        assert!(reader.is_resyncing());
        assert_eq!(reader.read_line(&mut source, &open, None).unwrap(), "OKAY");
        assert!(!reader.is_resyncing());
    }

    #[test]
    fn test_timeout_surfaces_as_error(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["OK"]);
        let open = AtomicBool::new(false);
        let result = reader.read_line(&mut source, &open, Some(Duration::from_millis(30)));
        assert!(matches!(result, Err(TransportError::TimedOut(30))));
    }

    #[test]
    fn test_late_tail_of_timed_out_reply_is_dropped(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["0100"]);
        let open = AtomicBool::new(false);
        let timeout = Some(Duration::from_millis(30));
        assert!(matches!(reader.read_line(&mut source, &open, timeout), Err(TransportError::TimedOut(30))));
        assert_eq!(reader.pending(), 0);

        source.feed("00\r");
        source.feed("02AAAA\r");
        assert_eq!(reader.read_line(&mut source, &open, timeout).unwrap(), "02AAAA");
    }

    #[test]
    fn test_silent_timeout_keeps_next_reply(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&[]);
        let open = AtomicBool::new(false);
        let timeout = Some(Duration::from_millis(30));
        assert!(reader.read_line(&mut source, &open, timeout).is_err());
        assert!(!reader.is_resyncing());

        source.feed("OKAYA896\r");
        assert_eq!(reader.read_line(&mut source, &open, timeout).unwrap(), "OKAYA896");
    }

    #[test]
    fn test_clear_cancels_resync(){
        let mut reader = LineReader::new(64);
        let mut source = ChunkedSource::new(&["01"]);
        let open = AtomicBool::new(false);
        assert!(reader.read_line(&mut source, &open, Some(Duration::from_millis(20))).is_err());
        assert!(reader.is_resyncing());
        reader.clear();
        source.feed("OKAY\r");
        assert_eq!(reader.read_line(&mut source, &open, None).unwrap(), "OKAY");
    }

    #[test]
    fn test_eof_is_a_read_error(){
        let mut reader = LineReader::new(64);
        let mut source: &[u8] = b"OKAY";
        let open = AtomicBool::new(false);
        let result = reader.read_line(&mut source, &open, None);
        assert!(matches!(result, Err(TransportError::Read(_))));
    }

    #[test]
    fn test_close_unblocks_pending_read(){
        let closed = Arc::new(AtomicBool::new(false));
        let closer = Arc::clone(&closed);

        let reader_thread = thread::spawn(move ||{
            let mut reader = LineReader::new(64);
            let mut source = ChunkedSource::new(&[]);
            reader.read_line(&mut source, &closed, None)
        });

        thread::sleep(Duration::from_millis(50));
        closer.store(true, Ordering::SeqCst);

        let result = reader_thread.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
