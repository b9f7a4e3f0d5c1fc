//! Function templates and their debug tables.

use luma_core::{ObjectId, Value};

/// Marker in `line_info` meaning "look up the absolute anchor for this pc".
pub const ABS_LINE_INFO: i8 = -0x80;
/// Largest run of relative entries between two absolute anchors.
pub const MAX_INSTR_WITHOUT_ABS: u32 = 128;
/// Line deltas must stay strictly below this magnitude to fit in an `i8`.
pub const LIM_LINE_DIFF: i64 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalDesc {
    pub name: Option<ObjectId>,
    /// Captures a register of the enclosing function (otherwise one of its
    /// upvalues).
    pub in_stack: bool,
    pub index: u8,
    pub kind: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocVar {
    pub name: Option<ObjectId>,
    /// First pc where the variable is active.
    pub start_pc: u32,
    /// First pc where the variable is dead.
    pub end_pc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsLineInfo {
    pub pc: u32,
    pub line: u32,
}

/// Compiled function template. Immutable once allocated on the heap.
#[derive(Debug, Clone, Default)]
pub struct Proto {
    pub source: Option<ObjectId>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    pub code: Vec<u32>,
    /// Nil, boolean, number or string values only.
    pub constants: Vec<Value>,
    pub protos: Vec<ObjectId>,
    pub upvalues: Vec<UpvalDesc>,
    pub line_info: Vec<i8>,
    pub abs_line_info: Vec<AbsLineInfo>,
    pub loc_vars: Vec<LocVar>,
}

impl Proto {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn deep_size(&self) -> usize {
        self.code.len() * 4
            + self.constants.len() * std::mem::size_of::<Value>()
            + self.protos.len() * std::mem::size_of::<ObjectId>()
            + self.upvalues.len() * std::mem::size_of::<UpvalDesc>()
            + self.line_info.len()
            + self.abs_line_info.len() * std::mem::size_of::<AbsLineInfo>()
            + self.loc_vars.len() * std::mem::size_of::<LocVar>()
    }

    /// Name of the `n`-th (1-based) local variable active at `pc`.
    pub fn local_name(&self, n: usize, pc: u32) -> Option<ObjectId> {
        if n == 0 {
            return None;
        }
        let mut n = n;
        for var in self.loc_vars.iter().take_while(|v| v.start_pc <= pc) {
            if pc < var.end_pc {
                n -= 1;
                if n == 0 {
                    return var.name;
                }
            }
        }
        None
    }

    /// Source line of the instruction at `pc`, if line info is present.
    pub fn line_at(&self, pc: u32) -> Option<u32> {
        if self.line_info.is_empty() || pc as usize >= self.line_info.len() {
            return None;
        }
        // Latest anchor at or before pc, else start from the definition line.
        let anchor = self.abs_line_info.partition_point(|a| a.pc <= pc);
        let (mut base_pc, mut line) = match anchor {
            0 => (None, self.line_defined as i64),
            i => {
                let a = self.abs_line_info[i - 1];
                (Some(a.pc), a.line as i64)
            }
        };
        loop {
            let next = base_pc.map_or(0, |p| p + 1);
            if next > pc {
                break;
            }
            let delta = self.line_info[next as usize];
            debug_assert_ne!(delta, ABS_LINE_INFO);
            line += delta as i64;
            base_pc = Some(next);
        }
        u32::try_from(line).ok()
    }
}

/// Builds the relative/absolute line tables one instruction at a time.
#[derive(Debug, Clone)]
pub struct LineInfoBuilder {
    previous_line: u32,
    instr_with_abs: u32,
    line_info: Vec<i8>,
    abs_line_info: Vec<AbsLineInfo>,
}

impl LineInfoBuilder {
    pub fn new(line_defined: u32) -> Self {
        Self {
            previous_line: line_defined,
            instr_with_abs: 0,
            line_info: Vec::new(),
            abs_line_info: Vec::new(),
        }
    }

    /// Record the line of the next instruction.
    pub fn push(&mut self, line: u32) {
        let pc = self.line_info.len() as u32;
        let mut diff = line as i64 - self.previous_line as i64;
        let too_far = diff.abs() >= LIM_LINE_DIFF;
        if too_far || {
            let run = self.instr_with_abs;
            self.instr_with_abs += 1;
            run >= MAX_INSTR_WITHOUT_ABS
        } {
            self.abs_line_info.push(AbsLineInfo { pc, line });
            diff = ABS_LINE_INFO as i64;
            self.instr_with_abs = 1;
        }
        self.line_info.push(diff as i8);
        self.previous_line = line;
    }

    /// Move the finished tables into `proto`.
    pub fn finish_into(self, proto: &mut Proto) {
        proto.line_info = self.line_info;
        proto.abs_line_info = self.abs_line_info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proto_with_lines(line_defined: u32, lines: &[u32]) -> Proto {
        let mut p = Proto {
            line_defined,
            ..Proto::new()
        };
        let mut b = LineInfoBuilder::new(line_defined);
        for &l in lines {
            b.push(l);
        }
        b.finish_into(&mut p);
        p
    }

    #[test]
    fn small_deltas_stay_relative() {
        let p = proto_with_lines(10, &[10, 11, 11, 13, 12]);
        assert_eq!(p.line_info, vec![0, 1, 0, 2, -1]);
        assert!(p.abs_line_info.is_empty());
        for (pc, want) in [10, 11, 11, 13, 12].iter().enumerate() {
            assert_eq!(p.line_at(pc as u32), Some(*want));
        }
    }

    #[test]
    fn large_jump_gets_an_anchor() {
        let p = proto_with_lines(1, &[1, 500, 501]);
        assert_eq!(p.line_info, vec![0, ABS_LINE_INFO, 1]);
        assert_eq!(p.abs_line_info, vec![AbsLineInfo { pc: 1, line: 500 }]);
        assert_eq!(p.line_at(2), Some(501));
    }

    #[test]
    fn long_runs_are_anchored_periodically() {
        let lines: Vec<u32> = (0..300).map(|i| 5 + i / 3).collect();
        let p = proto_with_lines(5, &lines);
        assert!(p.abs_line_info.len() >= 2);
        for (pc, want) in lines.iter().enumerate() {
            assert_eq!(p.line_at(pc as u32), Some(*want), "pc {pc}");
        }
        assert_eq!(p.line_at(300), None);
    }

    #[test]
    fn local_names_respect_ranges() {
        let p = Proto {
            loc_vars: vec![
                LocVar { name: Some(ObjectId(1)), start_pc: 0, end_pc: 10 },
                LocVar { name: Some(ObjectId(2)), start_pc: 2, end_pc: 4 },
                LocVar { name: Some(ObjectId(3)), start_pc: 5, end_pc: 9 },
            ],
            ..Proto::new()
        };
        assert_eq!(p.local_name(1, 3), Some(ObjectId(1)));
        assert_eq!(p.local_name(2, 3), Some(ObjectId(2)));
        assert_eq!(p.local_name(2, 6), Some(ObjectId(3)));
        assert_eq!(p.local_name(3, 6), None);
    }
}
