//! Compiled class-file decoder.
//!
//! Parses the binary class format (magic, constant pool, declared
//! relationships, field/method declarations, Signature and InnerClasses
//! attributes) into an immutable `ClassModel`. Method bodies are walked
//! instruction by instruction, but only the referentially meaningful opcode
//! families are classified; everything else becomes `Instruction::Other`.
//! No operand-stack simulation.

use thiserror::Error;

use crate::model::{ClassModel, FieldModel, Instruction, MethodModel, TypeRefKind};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("truncated class file at offset {0}")]
    Truncated(usize),
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },
    #[error("constant pool index {0} does not hold the expected entry")]
    BadConstantIndex(u16),
    #[error("unknown opcode 0x{opcode:02x} at code offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("code attribute truncated at offset {0}")]
    TruncatedCode(usize),
}

const MAGIC: u32 = 0xCAFE_BABE;

/// Decodes the raw bytes of one compiled class.
pub fn decode(bytes: &[u8]) -> Result<ClassModel, DecodeError> {
    let mut r = Reader::new(bytes);

    let magic = r.u4()?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let _minor = r.u2()?;
    let _major = r.u2()?;

    let pool = ConstantPool::parse(&mut r)?;

    let _access_flags = r.u2()?;
    let this_class = r.u2()?;
    let internal_name = pool.class_name(this_class)?.to_string();

    let super_index = r.u2()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?.to_string())
    };

    let interface_count = r.u2()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = r.u2()?;
        interfaces.push(pool.class_name(index)?.to_string());
    }

    let field_count = r.u2()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(&mut r, &pool)?);
    }

    let method_count = r.u2()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parse_method(&mut r, &pool)?);
    }

    let mut inner_classes = Vec::new();
    let mut signature = None;
    let attr_count = r.u2()?;
    for _ in 0..attr_count {
        let (name, data) = parse_attribute(&mut r, &pool)?;
        match name {
            "Signature" => signature = Some(read_signature(data, &pool)?),
            "InnerClasses" => inner_classes = read_inner_classes(data, &pool)?,
            _ => {}
        }
    }

    Ok(ClassModel {
        internal_name,
        super_name,
        interfaces,
        fields,
        methods,
        inner_classes,
        signature,
    })
}

fn parse_field(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<FieldModel, DecodeError> {
    let _access = r.u2()?;
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();

    let mut signature = None;
    let attr_count = r.u2()?;
    for _ in 0..attr_count {
        let (attr_name, data) = parse_attribute(r, pool)?;
        if attr_name == "Signature" {
            signature = Some(read_signature(data, pool)?);
        }
    }

    Ok(FieldModel {
        name,
        descriptor,
        signature,
    })
}

fn parse_method(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<MethodModel, DecodeError> {
    let _access = r.u2()?;
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();

    let mut signature = None;
    let mut instructions = Vec::new();
    let attr_count = r.u2()?;
    for _ in 0..attr_count {
        let (attr_name, data) = parse_attribute(r, pool)?;
        match attr_name {
            "Signature" => signature = Some(read_signature(data, pool)?),
            "Code" => instructions = parse_code(data, pool)?,
            _ => {}
        }
    }

    Ok(MethodModel {
        name,
        descriptor,
        signature,
        instructions,
    })
}

fn parse_attribute<'a, 'p>(
    r: &mut Reader<'a>,
    pool: &'p ConstantPool,
) -> Result<(&'p str, &'a [u8]), DecodeError> {
    let name_index = r.u2()?;
    let length = r.u4()? as usize;
    let data = r.take(length)?;
    Ok((pool.utf8(name_index)?, data))
}

fn read_signature(data: &[u8], pool: &ConstantPool) -> Result<String, DecodeError> {
    let mut r = Reader::new(data);
    Ok(pool.utf8(r.u2()?)?.to_string())
}

fn read_inner_classes(data: &[u8], pool: &ConstantPool) -> Result<Vec<String>, DecodeError> {
    let mut r = Reader::new(data);
    let count = r.u2()?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inner_info = r.u2()?;
        let _outer_info = r.u2()?;
        let _inner_name = r.u2()?;
        let _access = r.u2()?;
        names.push(pool.class_name(inner_info)?.to_string());
    }
    Ok(names)
}

fn parse_code(data: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>, DecodeError> {
    let mut r = Reader::new(data);
    let _max_stack = r.u2()?;
    let _max_locals = r.u2()?;
    let code_length = r.u4()? as usize;
    let code = r.take(code_length)?;
    // Exception table and nested attributes are not referentially meaningful.
    scan_code(code, pool)
}

fn scan_code(code: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut pc = 0usize;

    while pc < code.len() {
        let opcode = code[pc];
        let instruction = match opcode {
            // ldc / ldc_w: a reference only when the constant is a class or
            // array type literal; strings and numerics stay Other.
            0x12 => pool.class_constant(u8_at(code, pc + 1)? as u16),
            0x13 => pool.class_constant(u16_at(code, pc + 1)?),
            // new / anewarray / checkcast / instanceof
            0xbb => type_ref(TypeRefKind::New, code, pc, pool)?,
            0xbd => type_ref(TypeRefKind::ANewArray, code, pc, pool)?,
            0xc0 => type_ref(TypeRefKind::Checkcast, code, pc, pool)?,
            0xc1 => type_ref(TypeRefKind::InstanceOf, code, pc, pool)?,
            0xc5 => {
                let descriptor = pool.class_name(u16_at(code, pc + 1)?)?.to_string();
                let dims = u8_at(code, pc + 3)?;
                Some(Instruction::MultiNewArray { descriptor, dims })
            }
            // invokevirtual / invokespecial / invokestatic / invokeinterface
            0xb6..=0xb9 => {
                let (owner, name, descriptor) = pool.member_ref(u16_at(code, pc + 1)?)?;
                Some(Instruction::InvokeMethod {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            // getstatic / putstatic / getfield / putfield
            0xb2..=0xb5 => {
                let (owner, name, descriptor) = pool.member_ref(u16_at(code, pc + 1)?)?;
                Some(Instruction::AccessField {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            _ => None,
        };

        instructions.push(instruction.unwrap_or(Instruction::Other));
        pc += instruction_length(code, pc)?;
    }

    Ok(instructions)
}

fn type_ref(
    kind: TypeRefKind,
    code: &[u8],
    pc: usize,
    pool: &ConstantPool,
) -> Result<Option<Instruction>, DecodeError> {
    let descriptor = pool.class_name(u16_at(code, pc + 1)?)?.to_string();
    Ok(Some(Instruction::TypeRef { kind, descriptor }))
}

/// Total byte length of the instruction at `pc`, including the opcode.
///
/// tableswitch and lookupswitch pad their operands to a 4-byte boundary
/// relative to the start of the code array; wide doubles the index width of
/// the wrapped instruction.
fn instruction_length(code: &[u8], pc: usize) -> Result<usize, DecodeError> {
    let opcode = code[pc];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xaa => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let low = u32_at(code, base + 4)? as i32 as i64;
            let high = u32_at(code, base + 8)? as i32 as i64;
            if high < low {
                return Err(DecodeError::TruncatedCode(pc));
            }
            1 + pad + 12 + 4 * (high - low + 1) as usize
        }
        0xab => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            let base = pc + 1 + pad;
            let npairs = u32_at(code, base + 4)? as i32;
            if npairs < 0 {
                return Err(DecodeError::TruncatedCode(pc));
            }
            1 + pad + 8 + 8 * npairs as usize
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc4 => {
            if u8_at(code, pc + 1)? == 0x84 {
                6
            } else {
                4
            }
        }
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => {
            return Err(DecodeError::UnknownOpcode {
                opcode,
                offset: pc,
            });
        }
    };

    if pc + length > code.len() {
        return Err(DecodeError::TruncatedCode(pc));
    }
    Ok(length)
}

fn u8_at(code: &[u8], at: usize) -> Result<u8, DecodeError> {
    code.get(at)
        .copied()
        .ok_or(DecodeError::TruncatedCode(at))
}

fn u16_at(code: &[u8], at: usize) -> Result<u16, DecodeError> {
    if at + 2 > code.len() {
        return Err(DecodeError::TruncatedCode(at));
    }
    Ok(u16::from_be_bytes([code[at], code[at + 1]]))
}

fn u32_at(code: &[u8], at: usize) -> Result<u32, DecodeError> {
    if at + 4 > code.len() {
        return Err(DecodeError::TruncatedCode(at));
    }
    Ok(u32::from_be_bytes([
        code[at],
        code[at + 1],
        code[at + 2],
        code[at + 3],
    ]))
}

#[derive(Debug)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    MemberRef { class_index: u16, nat_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    /// Entries the rule engine never resolves, and the high half of
    /// long/double constants.
    Opaque,
}

#[derive(Debug)]
struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = r.u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Opaque); // index 0 is unused

        let mut index = 1u16;
        while index < count {
            let tag = r.u1()?;
            let constant = match tag {
                1 => {
                    let length = r.u2()? as usize;
                    let bytes = r.take(length)?;
                    Constant::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                3 | 4 => {
                    r.take(4)?;
                    Constant::Opaque
                }
                5 | 6 => {
                    r.take(8)?;
                    // Long and double constants occupy two pool slots.
                    entries.push(Constant::Opaque);
                    index += 1;
                    Constant::Opaque
                }
                7 => Constant::Class { name_index: r.u2()? },
                8 => {
                    r.take(2)?;
                    Constant::Opaque
                }
                9 | 10 | 11 => Constant::MemberRef {
                    class_index: r.u2()?,
                    nat_index: r.u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: r.u2()?,
                    descriptor_index: r.u2()?,
                },
                15 => {
                    r.take(3)?;
                    Constant::Opaque
                }
                16 | 19 | 20 => {
                    r.take(2)?;
                    Constant::Opaque
                }
                17 | 18 => {
                    r.take(4)?;
                    Constant::Opaque
                }
                _ => return Err(DecodeError::UnknownConstantTag { tag, index }),
            };
            entries.push(constant);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, DecodeError> {
        if index == 0 {
            return Err(DecodeError::BadConstantIndex(index));
        }
        self.entries
            .get(index as usize)
            .ok_or(DecodeError::BadConstantIndex(index))
    }

    fn utf8(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(DecodeError::BadConstantIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(DecodeError::BadConstantIndex(index)),
        }
    }

    /// Resolves a field/method/interface-method reference to
    /// `(owner class, member name, descriptor)`.
    fn member_ref(&self, index: u16) -> Result<(&str, &str, &str), DecodeError> {
        let (class_index, nat_index) = match self.get(index)? {
            Constant::MemberRef {
                class_index,
                nat_index,
            } => (*class_index, *nat_index),
            _ => return Err(DecodeError::BadConstantIndex(index)),
        };
        let owner = self.class_name(class_index)?;
        let (name, descriptor) = match self.get(nat_index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => (self.utf8(*name_index)?, self.utf8(*descriptor_index)?),
            _ => return Err(DecodeError::BadConstantIndex(nat_index)),
        };
        Ok((owner, name, descriptor))
    }

    /// `Some(LoadClassConstant)` when the pool entry is a class constant,
    /// `None` for every other loadable constant.
    fn class_constant(&self, index: u16) -> Option<Instruction> {
        match self.entries.get(index as usize) {
            Some(Constant::Class { name_index }) => {
                self.utf8(*name_index).ok().map(|name| Instruction::LoadClassConstant {
                    class_name: name.to_string(),
                })
            }
            _ => None,
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
