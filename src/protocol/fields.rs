//! Fixed-width field slicing for device replies.
//!
//! The tracker is assumed to send well-formed ASCII. Anything short or
//! non-numeric is reported as `ProtocolError::Malformed` instead of being
//! read past the end of the line.

use crate::error::ProtocolError;

pub struct FieldCursor<'a>{
    line: &'a str,
    pos: usize,
    what: &'static str,
}

impl<'a> FieldCursor<'a>{
    pub fn new(line: &'a str, what: &'static str) -> Self{
        FieldCursor{ line, pos: 0, what }
    }

    pub fn position(&self) -> usize{
        self.pos
    }

    pub fn remaining(&self) -> &'a str{
        self.line.get(self.pos..).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool{
        self.remaining().is_empty()
    }

    pub fn take(&mut self, width: usize) -> Result<&'a str, ProtocolError>{
        let end = self.pos + width;
        let field = self.line.get(self.pos..end).ok_or_else(||{
            ProtocolError::malformed(
                self.what,
                format!("need {} bytes at offset {}, line is {} bytes", width, self.pos, self.line.len()),
            )
        })?;
        self.pos = end;
        Ok(field)
    }

    pub fn skip(&mut self, width: usize) -> Result<(), ProtocolError>{
        self.take(width).map(|_| ())
    }

    pub fn hex(&mut self, width: usize) -> Result<u32, ProtocolError>{
        let at = self.pos;
        let field = self.take(width)?;
        u32::from_str_radix(field, 16).map_err(|_|{
            ProtocolError::malformed(self.what, format!("{:?} at offset {} is not hexadecimal", field, at))
        })
    }

    /// Signed decimal such as `+10000` or `-000512`.
    pub fn decimal(&mut self, width: usize) -> Result<f64, ProtocolError>{
        let at = self.pos;
        let field = self.take(width)?;
        let digits = field.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(field);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()){
            return Err(ProtocolError::malformed(
                self.what,
                format!("{:?} at offset {} is not a decimal field", field, at),
            ));
        }
        field.parse::<f64>().map_err(|e| ProtocolError::malformed(self.what, e.to_string()))
    }

    /// Consumes `word` if the line continues with it.
    pub fn eat(&mut self, word: &str) -> bool{
        if self.remaining().starts_with(word){
            self.pos += word.len();
            true
        }else{
            false
        }
    }

    /// Returns everything up to `delimiter` and consumes the delimiter too.
    pub fn until(&mut self, delimiter: char) -> Result<&'a str, ProtocolError>{
        let rest = self.remaining();
        let end = rest.find(delimiter).ok_or_else(||{
            ProtocolError::malformed(self.what, format!("missing {:?} after offset {}", delimiter, self.pos))
        })?;
        self.pos += end + delimiter.len_utf8();
        Ok(&rest[..end])
    }

    pub fn expect(&mut self, delimiter: char) -> Result<(), ProtocolError>{
        let at = self.pos;
        let mut buf = [0u8; 4];
        let expected = delimiter.encode_utf8(&mut buf);
        if self.eat(expected){
            Ok(())
        }else{
            Err(ProtocolError::malformed(self.what, format!("expected {:?} at offset {}", delimiter, at)))
        }
    }
}
