use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;

use crate::atom::Atom;
use crate::bond::{Bond, BondOrder};
use crate::consts::ElementProperties;
use crate::error::SdfError;
use crate::fragment::Fragment;
use crate::molecule::{Molecule, Molecule3D};

/// Data field holding the attachment-point classes of a stored fragment.
pub const CLASS_FIELD: &str = "CLASS";
/// Data field holding the host to bond order map of a stored fragment.
pub const ATTACHMENT_POINTS_FIELD: &str = "ATTACHMENT_POINTS";
/// Data field holding the attachment-point tip coordinates of a stored fragment.
pub const AP_DIRECTIONS_FIELD: &str = "AP_DIRECTIONS";

const DESCRIPTOR_FIELDS: [&str; 3] = [CLASS_FIELD, ATTACHMENT_POINTS_FIELD, AP_DIRECTIONS_FIELD];

/// One line of the V2000 atom block.
#[derive(Debug, Default)]
pub struct AtomV2000 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub symbol: String,
    /// Mass difference from the most abundant isotope
    pub isotope_mass_difference: Option<i8>,
    /// Charge column code: 1 = +3, 2 = +2, 3 = +1, 5 = -1, 6 = -2, 7 = -3
    pub charge_code: Option<i8>,
}

impl AtomV2000 {
    pub fn formal_charge(&self) -> i8 {
        match self.charge_code {
            Some(1) => 3,
            Some(2) => 2,
            Some(3) => 1,
            Some(5) => -1,
            Some(6) => -2,
            Some(7) => -3,
            _ => 0,
        }
    }
}

impl FromStr for AtomV2000 {
    type Err = SdfError;

    /// Reads the fixed columns of an atom line; columns after the charge are ignored.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || SdfError::InvalidAtom(input.to_string());
        let column = |start: usize, end: usize| input.get(start..end.min(input.len())).map(str::trim);
        let coordinate = |start: usize| {
            column(start, start + 10)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(invalid)
        };
        let symbol = column(31, 34).filter(|symbol| !symbol.is_empty()).ok_or_else(invalid)?;
        Ok(AtomV2000 {
            x: coordinate(0)?,
            y: coordinate(10)?,
            z: coordinate(20)?,
            symbol: symbol.to_string(),
            isotope_mass_difference: column(34, 36).and_then(|value| value.parse().ok()),
            charge_code: column(36, 39).and_then(|value| value.parse().ok()),
        })
    }
}

impl Bond {
    /// Parses the first three fixed columns of a V2000 bond line. Indices become 0-based.
    pub fn from_mol_line(line: &str) -> Result<Self, SdfError> {
        let invalid = || SdfError::InvalidBond(line.to_string());
        let column = |start: usize| line.get(start..start + 3).map(str::trim).ok_or_else(invalid);
        let index = |start: usize| {
            column(start)?
                .parse::<usize>()
                .ok()
                .and_then(|index| index.checked_sub(1))
                .ok_or_else(invalid)
        };
        Ok(Bond {
            atom1: index(0)?,
            atom2: index(3)?,
            bond_order: BondOrder::from_sdf_str(column(6)?).ok_or_else(invalid)?,
        })
    }
}

/// The counts line of a V2000 block.
#[derive(Debug, Default)]
pub struct CountsLine {
    pub num_atoms: usize,
    pub num_bonds: usize,
    pub chiral_flag: u8,
    pub version: String,
}

impl FromStr for CountsLine {
    type Err = SdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SdfError::InvalidCounts(s.to_string());
        let count = |start: usize| {
            s.get(start..start + 3)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .ok_or_else(invalid)
        };
        let version = s.get(33..).map(str::trim).unwrap_or_default();
        if version == "V3000" {
            return Err(invalid());
        }
        Ok(CountsLine {
            num_atoms: count(0)?,
            num_bonds: count(3)?,
            chiral_flag: s
                .get(12..15)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0),
            version: version.to_string(),
        })
    }
}

/// The connection table of one SDF record.
#[derive(Debug, Default)]
pub struct MOLFile {
    /// Title, program and comment lines.
    pub header: Vec<String>,
    pub counts_line: CountsLine,
    pub atoms: Vec<AtomV2000>,
    pub bonds: Vec<Bond>,
    /// `M  CHG` entries as (0-based atom, charge). When present they replace the charge column.
    pub charges: Vec<(usize, i8)>,
    /// Property lines other than `M  CHG` and `M  END`.
    pub properties: Vec<String>,
}

#[derive(Debug)]
pub struct SDFEntry {
    pub mol_file: MOLFile,
    pub data_fields: BTreeMap<String, String>,
}

enum ParserState {
    Header(usize),
    Atoms,
    Bonds,
    Properties,
}

fn parse_charges(line: &str, mol_file: &mut MOLFile) -> Result<(), SdfError> {
    let invalid = || SdfError::InvalidAtom(line.to_string());
    let values = line
        .split_whitespace()
        .skip(3)
        .map(|value| value.parse::<i64>().map_err(|_| invalid()))
        .collect::<Result<Vec<i64>, _>>()?;
    for pair in values.chunks(2) {
        let &[atom, charge] = pair else {
            return Err(invalid());
        };
        let atom = usize::try_from(atom).ok().and_then(|atom| atom.checked_sub(1)).ok_or_else(invalid)?;
        let charge = i8::try_from(charge).map_err(|_| invalid())?;
        mol_file.charges.push((atom, charge));
    }
    Ok(())
}

/// Reads one connection table up to `M  END`. `None` when the input holds nothing but
/// blank lines.
fn parse_mol_file<I>(lines: &mut I) -> Result<Option<MOLFile>, SdfError>
where
    I: Iterator<Item = Result<String, io::Error>>,
{
    let mut mol_file = MOLFile::default();
    let mut state = ParserState::Header(0);

    for line in lines.by_ref() {
        let line = line?;
        state = match state {
            ParserState::Header(count) if count < 3 => {
                mol_file.header.push(line);
                ParserState::Header(count + 1)
            }
            ParserState::Header(_) => {
                mol_file.counts_line = line.parse()?;
                if mol_file.counts_line.num_atoms > 0 {
                    ParserState::Atoms
                } else if mol_file.counts_line.num_bonds > 0 {
                    ParserState::Bonds
                } else {
                    ParserState::Properties
                }
            }
            ParserState::Atoms => {
                mol_file.atoms.push(line.parse()?);
                if mol_file.atoms.len() < mol_file.counts_line.num_atoms {
                    ParserState::Atoms
                } else if mol_file.counts_line.num_bonds > 0 {
                    ParserState::Bonds
                } else {
                    ParserState::Properties
                }
            }
            ParserState::Bonds => {
                mol_file.bonds.push(Bond::from_mol_line(&line)?);
                if mol_file.bonds.len() < mol_file.counts_line.num_bonds {
                    ParserState::Bonds
                } else {
                    ParserState::Properties
                }
            }
            ParserState::Properties => {
                let trimmed = line.trim();
                if trimmed == "M  END" {
                    return Ok(Some(mol_file));
                } else if trimmed.starts_with("M  CHG") {
                    parse_charges(trimmed, &mut mol_file)?;
                } else {
                    mol_file.properties.push(line);
                }
                ParserState::Properties
            }
        };
    }

    if matches!(state, ParserState::Header(_)) && mol_file.header.iter().all(|line| line.trim().is_empty()) {
        return Ok(None);
    }
    Err(SdfError::UnexpectedEndOfFile)
}

fn flush_field(current: &mut Option<(String, Vec<String>)>, data_fields: &mut BTreeMap<String, String>) {
    if let Some((name, values)) = current.take() {
        data_fields.insert(name, values.join("\n"));
    }
}

/// Reads the data items following `M  END`, up to `$$$$` or the end of the input.
fn parse_data_fields<I>(lines: &mut I) -> Result<BTreeMap<String, String>, SdfError>
where
    I: Iterator<Item = Result<String, io::Error>>,
{
    let mut data_fields = BTreeMap::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for line in lines.by_ref() {
        let line = line?;
        if line.trim() == "$$$$" {
            break;
        }
        if line.starts_with('>') {
            flush_field(&mut current, &mut data_fields);
            // > <NAME> or >  <NAME> (extra)
            let name = line
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(name, _)| name.trim().to_string())
                .unwrap_or_default();
            current = Some((name, Vec::new()));
        } else if line.trim().is_empty() {
            flush_field(&mut current, &mut data_fields);
        } else if let Some((_, values)) = current.as_mut() {
            values.push(line.trim_end().to_string());
        }
    }
    flush_field(&mut current, &mut data_fields);
    Ok(data_fields)
}

pub fn parse_sdf_file<R: BufRead>(reader: R) -> Result<Vec<SDFEntry>, SdfError> {
    let mut entries = Vec::new();
    let mut lines = reader.lines();
    while let Some(mol_file) = parse_mol_file(&mut lines)? {
        let data_fields = parse_data_fields(&mut lines)?;
        entries.push(SDFEntry { mol_file, data_fields });
    }
    Ok(entries)
}

impl Molecule3D {
    pub fn from_sdf<T: AsRef<Path>>(sdf: T) -> Result<Vec<Self>, SdfError> {
        let file = std::fs::File::open(sdf)?;
        let reader = BufReader::new(file);
        parse_sdf_file(reader)?
            .into_iter()
            .map(Self::from_sdf_entry)
            .collect()
    }

    /// Builds a molecule from a parsed record. The first header line becomes the title and
    /// the data items become data fields.
    pub fn from_sdf_entry(entry: SDFEntry) -> Result<Self, SdfError> {
        let SDFEntry { mol_file, data_fields } = entry;
        let mut molecule = Molecule3D::new()
            .with_title(mol_file.header.first().map(|title| title.trim()).unwrap_or_default());
        molecule.data_fields = data_fields;

        for atom in &mol_file.atoms {
            let atomic_number = atom
                .symbol
                .as_str()
                .atomic_number()
                .ok_or_else(|| SdfError::UnknownElement(atom.symbol.clone()))?;
            molecule.add_atom(
                Atom::new(atomic_number)
                    .with_position((atom.x, atom.y, atom.z))
                    .with_charge(atom.formal_charge()),
            );
        }

        let atom_count = molecule.len();
        let out_of_range = |atom: usize| SdfError::BondOutOfRange {
            atom: atom + 1,
            atoms: atom_count,
        };
        if !mol_file.charges.is_empty() {
            molecule.charges.iter_mut().for_each(|charge| *charge = 0);
            for &(atom, charge) in &mol_file.charges {
                *molecule.charges.get_mut(atom).ok_or_else(|| out_of_range(atom))? = charge;
            }
        }
        for bond in &mol_file.bonds {
            for atom in [bond.atom1, bond.atom2] {
                if atom >= atom_count {
                    return Err(out_of_range(atom));
                }
            }
            molecule.add_bond(bond.atom1, bond.atom2, bond.bond_order);
        }
        Ok(molecule)
    }

    /// Writes the molecule as one V2000 record, followed by its data fields.
    pub fn write_sdf<W: Write>(&self, writer: &mut W) -> Result<(), SdfError> {
        write_record(writer, self, &self.data_fields)
    }
}

fn write_record<W: Write>(
    writer: &mut W,
    molecule: &Molecule3D,
    data_fields: &BTreeMap<String, String>,
) -> Result<(), SdfError> {
    let edges = molecule.get_edges_with_order();
    writeln!(writer, "{}", molecule.title)?;
    writeln!(writer, "  fragmentation     3D")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
        molecule.len(),
        edges.len()
    )?;
    for atom in 0..molecule.len() {
        let position = molecule.position(atom);
        let symbol = molecule.get_atomic_number(atom).atomic_symbol().unwrap_or("*");
        writeln!(
            writer,
            "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
            position.x, position.y, position.z, symbol
        )?;
    }
    for (atom1, atom2, order) in edges {
        writeln!(writer, "{:>3}{:>3}{:>3}  0  0  0  0", atom1 + 1, atom2 + 1, order.code())?;
    }
    let charged: Vec<(usize, i8)> = (0..molecule.len())
        .map(|atom| (atom, molecule.charge(atom)))
        .filter(|&(_, charge)| charge != 0)
        .collect();
    for chunk in charged.chunks(8) {
        write!(writer, "M  CHG{:>3}", chunk.len())?;
        for (atom, charge) in chunk {
            write!(writer, "{:>4}{:>4}", atom + 1, charge)?;
        }
        writeln!(writer)?;
    }
    writeln!(writer, "M  END")?;
    for (name, value) in data_fields {
        writeln!(writer, "> <{name}>\n{value}\n")?;
    }
    writeln!(writer, "$$$$")?;
    Ok(())
}

impl Fragment {
    /// Restores a stored fragment. Records without a `CLASS` field give a fragment without
    /// attachment points.
    pub fn from_sdf_entry(entry: SDFEntry) -> Result<Fragment, SdfError> {
        let molecule = Molecule3D::from_sdf_entry(entry)?;
        let field = |name: &str| molecule.data_fields.get(name).cloned();
        let (class, attachment_points, directions) =
            (field(CLASS_FIELD), field(ATTACHMENT_POINTS_FIELD), field(AP_DIRECTIONS_FIELD));
        match class {
            Some(class) => Ok(Fragment::from_descriptors(
                molecule,
                &class,
                attachment_points.as_deref(),
                directions.as_deref(),
            )?),
            None => {
                let parent_atoms = (0..molecule.len()).collect();
                Ok(Fragment::new(molecule, Vec::new(), parent_atoms))
            }
        }
    }

    /// Writes the fragment with its descriptors replacing any stale descriptor fields.
    pub fn write_sdf<W: Write>(&self, writer: &mut W) -> Result<(), SdfError> {
        let mut data_fields: BTreeMap<String, String> = self
            .molecule
            .data_fields
            .iter()
            .filter(|(name, _)| !DESCRIPTOR_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !self.attachment_points.is_empty() {
            data_fields.insert(CLASS_FIELD.to_string(), self.class_descriptor());
            data_fields.insert(ATTACHMENT_POINTS_FIELD.to_string(), self.attachment_points_descriptor());
            data_fields.insert(AP_DIRECTIONS_FIELD.to_string(), self.directions_descriptor());
        }
        write_record(writer, &self.molecule, &data_fields)
    }
}

pub fn read_fragments<R: BufRead>(reader: R) -> Result<Vec<Fragment>, SdfError> {
    parse_sdf_file(reader)?
        .into_iter()
        .map(Fragment::from_sdf_entry)
        .collect()
}

pub fn write_fragments<'a, W, I>(writer: &mut W, fragments: I) -> Result<(), SdfError>
where
    W: Write,
    I: IntoIterator<Item = &'a Fragment>,
{
    for fragment in fragments {
        fragment.write_sdf(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::AttachmentPoint;
    use crate::rules::AttachmentPointClass;
    use crate::vector::Vector;
    use std::io::Cursor;

    #[test]
    fn test_parse_sdf_file() {
        let sdf_content = "\
        5460033
  -OEChem-09092410012D

 11  8  0     0  0  0  0  0  0999 V2000
    3.2690    0.1614    0.0000 Pt  0  0  0  0  0  0  0  0  0  0  0  0
    3.9761    0.8685    0.0000 Cl  0  0  0  0  0  0  0  0  0  0  0  0
    3.9761   -0.5458    0.0000 Cl  0  0  0  0  0  0  0  0  0  0  0  0
    2.8464   -0.7450    0.0000 N   0  0  0  0  0  0  0  0  0  0  0  0
    2.5619    0.8685    0.0000 N   0  0  0  0  0  0  0  0  0  0  0  0
    2.5844   -1.3069    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
    2.2844   -0.4829    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
    3.4084   -1.0070    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
    2.1235    1.3069    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
    3.0003    1.3069    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
    2.0000    0.6064    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0  0  0  0
  1  3  1  0  0  0  0
  4  6  1  0  0  0  0
  4  7  1  0  0  0  0
  4  8  1  0  0  0  0
  5  9  1  0  0  0  0
  5 10  1  0  0  0  0
  5 11  1  0  0  0  0
M  END
> <PUBCHEM_COMPOUND_CID>
5460033

> <PUBCHEM_IUPAC_NAME>
azane;dichloroplatinum

> <PUBCHEM_NONSTANDARDBOND>
1  4  6
1  5  6

> <PUBCHEM_COORDINATE_TYPE>
1
5
255

$$$$
";

        let entries = parse_sdf_file(Cursor::new(sdf_content)).unwrap();
        assert_eq!(entries.len(), 1);

        let first = &entries[0];
        assert_eq!(first.mol_file.atoms.len(), 11);
        assert_eq!(first.mol_file.bonds.len(), 8);
        assert_eq!(first.data_fields.len(), 4);
        assert_eq!(first.data_fields.get("PUBCHEM_COMPOUND_CID"), Some(&"5460033".to_string()));
        assert_eq!(first.data_fields.get("PUBCHEM_NONSTANDARDBOND"), Some(&"1  4  6\n1  5  6".to_string()));

        let molecule = Molecule3D::from_sdf_entry(entries.into_iter().next().unwrap()).unwrap();
        assert_eq!(molecule.title, "5460033");
        assert_eq!(molecule.get_atomic_number(0), 78);
        assert_eq!(molecule.number_of_bonds(), 8);
        assert_eq!(molecule.molecular_formula().to_string(), "Cl2H6N2Pt");
        assert!(!molecule.is_three_dimensional());
    }

    #[test]
    fn test_parse_sdf_file_single_entry() {
        let sdf_content = "\
Compound 1
  -OEChem-01152411432D

  1  0  0     0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
M  END
> <PUBCHEM_COMPOUND_CID>
1

$$$$
";

        let entries = parse_sdf_file(Cursor::new(sdf_content)).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.mol_file.atoms.len(), 1);
        assert_eq!(entry.mol_file.bonds.len(), 0);
        assert_eq!(entry.data_fields.len(), 1);
        assert_eq!(entry.data_fields.get("PUBCHEM_COMPOUND_CID"), Some(&"1".to_string()));
    }

    #[test]
    fn test_parse_sdf_file_missing_end_delimiter() {
        let sdf_content = "\
Compound 1
  -OEChem-01152411432D

  1  0  0     0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
M  END
> <PUBCHEM_COMPOUND_CID>
1
";

        let entries = parse_sdf_file(Cursor::new(sdf_content)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data_fields.get("PUBCHEM_COMPOUND_CID"), Some(&"1".to_string()));
    }

    #[test]
    fn test_parse_sdf_file_empty_input() {
        assert!(parse_sdf_file(Cursor::new("")).unwrap().is_empty());
        assert!(parse_sdf_file(Cursor::new("\n")).unwrap().is_empty());
    }

    #[test]
    fn truncated_and_broken_records_are_errors() {
        let truncated = "Compound 1\n\n\n  2  0  0     0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 H   0  0\n";
        assert!(matches!(
            parse_sdf_file(Cursor::new(truncated)),
            Err(SdfError::UnexpectedEndOfFile)
        ));
        let bad_bond = "x\n\n\n  2  1  0     0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 H   0  0\n    0.7000    0.0000    0.0000 H   0  0\n  1  3  1  0\nM  END\n$$$$\n";
        let entry = parse_sdf_file(Cursor::new(bad_bond)).unwrap().into_iter().next().unwrap();
        assert!(matches!(
            Molecule3D::from_sdf_entry(entry),
            Err(SdfError::BondOutOfRange { atom: 3, atoms: 2 })
        ));
    }

    #[test]
    fn charges_from_property_lines() {
        let content = "acetate\n\n\n  2  1  0     0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 C   0  3\n    1.3000    0.0000    0.1000 O   0  0\n  1  2  1  0\nM  CHG  1   2  -1\nM  END\n$$$$\n";
        let entry = parse_sdf_file(Cursor::new(content)).unwrap().into_iter().next().unwrap();
        let molecule = Molecule3D::from_sdf_entry(entry).unwrap();
        // M  CHG replaces the charge column
        assert_eq!(molecule.charges, vec![0, -1]);
    }

    #[test]
    fn written_molecules_read_back() {
        let mut molecule = Molecule3D::from_xyz_str("C 0 0 0\nO 1.25 0 0.1\nO -0.6 1.1 0\n").unwrap().with_title("formate");
        molecule.charges[2] = -1;
        molecule.data_fields.insert("SOURCE".into(), "test".into());
        let mut buffer = Vec::new();
        molecule.write_sdf(&mut buffer).unwrap();
        let read = Molecule3D::from_sdf_entry(
            parse_sdf_file(Cursor::new(buffer)).unwrap().into_iter().next().unwrap(),
        )
        .unwrap();
        assert_eq!(read.title, "formate");
        assert_eq!(read.charges, molecule.charges);
        assert_eq!(read.get_edges_with_order(), molecule.get_edges_with_order());
        assert_eq!(read.data_fields.get("SOURCE").map(String::as_str), Some("test"));
        assert!((read.position(1) - Vector::new(1.25, 0.0, 0.1)).length() < 1e-9);
    }

    #[test]
    fn fragments_keep_their_descriptors() {
        let molecule = Molecule3D::from_xyz_str("C 0 0 0\nO 1.43 0 0.1\n").unwrap();
        let aps = vec![
            AttachmentPoint::new(0, AttachmentPointClass::new("CC", 0), BondOrder::Single, Vector::new(-1.5, 0.0, 0.0)),
            AttachmentPoint::new(1, AttachmentPointClass::new("OH", 0), BondOrder::Single, Vector::new(0.5, 0.8, 0.0)),
        ];
        let fragment = Fragment::new(molecule, aps, vec![0, 1]);
        let bare = Fragment::new(Molecule3D::from_xyz_str("Na 0 0 0.5\n").unwrap(), vec![], vec![0]);
        let mut buffer = Vec::new();
        write_fragments(&mut buffer, [&fragment, &bare]).unwrap();

        let read = read_fragments(Cursor::new(buffer)).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].class_descriptor(), "1#CC:0:1 2#OH:0:1");
        assert_eq!(read[0].attachment_points_descriptor(), fragment.attachment_points_descriptor());
        assert_eq!(read[0].directions_descriptor(), fragment.directions_descriptor());
        assert!(read[1].attachment_points.is_empty());
    }
}
