//in-memory transport that answers commands from a script, for protocol and driver tests

use std::collections::VecDeque;
use std::io;

use crate::error::TransportError;
use super::{LineSettings, Transport};

struct Rule{
    prefix: String,
    replies: VecDeque<String>,
}

#[derive(Default)]
pub struct ScriptedTransport{
    rules: Vec<Rule>,
    pub sent: Vec<String>,
    pub configured: Vec<LineSettings>,
    pub breaks: usize,
    pub open_path: Option<String>,
    pub close_calls: usize,
    pub fail_open: bool,
    pub fail_reconfigure: bool,
    pending: VecDeque<String>,
}

impl ScriptedTransport{
    pub fn new() -> Self{
        Self::default()
    }

    /// Answers commands starting with `prefix`; the last reply given repeats.
    pub fn reply(mut self, prefix: &str, reply: &str) -> Self{
        match self.rules.iter_mut().find(|r| r.prefix == prefix){
            Some(rule) => rule.replies.push_back(reply.to_string()),
            None => self.rules.push(Rule{
                prefix: prefix.to_string(),
                replies: VecDeque::from([reply.to_string()]),
            }),
        }
        self
    }

    /// Replies used by a device with no tools attached.
    pub fn empty_device() -> Self{
        ScriptedTransport::new()
            .reply("RESET 1", "RESETBE6F")
            .reply("COMM A0001", "OKAYA896")
            .reply("INIT ", "OKAYA896")
            .reply("BEEP 2", "0")
            .reply("PHSR", "00")
            .reply("TSTART 80", "OKAYA896")
            .reply("TSTOP ", "OKAYA896")
    }

    pub fn sent_with_prefix(&self, prefix: &str) -> Vec<&str>{
        self.sent.iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| c.as_str())
            .collect()
    }
}

impl Transport for ScriptedTransport{
    fn open(&mut self, path: &str) -> Result<(), TransportError>{
        if self.fail_open{
            return Err(TransportError::Configure(format!("cannot open {}", path)));
        }
        self.open_path = Some(path.to_string());
        Ok(())
    }

    fn close(&mut self){
        self.close_calls += 1;
        self.open_path = None;
        self.pending.clear();
    }

    fn is_open(&self) -> bool{
        self.open_path.is_some()
    }

    fn configure(&mut self, settings: &LineSettings) -> Result<(), TransportError>{
        if self.open_path.is_none(){
            return Err(TransportError::NotOpen);
        }
        if self.fail_reconfigure && !self.configured.is_empty(){
            return Err(TransportError::Configure("baud rate rejected".to_string()));
        }
        self.configured.push(*settings);
        Ok(())
    }

    fn send_break(&mut self) -> Result<(), TransportError>{
        self.breaks += 1;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError>{
        if self.open_path.is_none(){
            return Err(TransportError::NotOpen);
        }
        self.sent.push(command.to_string());

        let rule = self.rules.iter_mut()
            .filter(|r| command.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len());
        if let Some(rule) = rule{
            let reply = if rule.replies.len() > 1{
                rule.replies.pop_front()
            }else{
                rule.replies.front().cloned()
            };
            self.pending.extend(reply);
        }
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String, TransportError>{
        if self.open_path.is_none(){
            return Err(TransportError::NotOpen);
        }
        self.pending.pop_front().ok_or_else(||{
            TransportError::Read(io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted reply"))
        })
    }
}
