//! VTK output for visualization.
//!
//! Writes VTU (XML UnstructuredGrid) files readable by ParaView, one file per
//! output frame, plus a PVD collection that lists every frame with its time.
//! The mesh is written as linear quads (VTK cell type 9) with all fields as
//! point data. Vectors are padded to three components as VTK expects.
//!
//! Output is fully determined by its inputs, so rewriting a frame with
//! unchanged fields produces byte-identical files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{FieldValues, NamedField, OutputError, VisualizationSink};
use crate::mesh::BoxMesh;

/// VTK cell type id of a linear quadrilateral
const VTK_QUAD: u8 = 9;

/// VTK XML writer helper.
struct VtkWriter<W: Write> {
    writer: BufWriter<W>,
    indent: usize,
}

impl<W: Write> VtkWriter<W> {
    fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            indent: 0,
        }
    }

    fn write_indent(&mut self) -> std::io::Result<()> {
        for _ in 0..self.indent {
            write!(self.writer, "  ")?;
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.write_indent()?;
        writeln!(self.writer, "{text}")
    }

    fn start_element(&mut self, name: &str, attrs: &[(&str, String)]) -> std::io::Result<()> {
        self.write_indent()?;
        write!(self.writer, "<{name}")?;
        for (key, value) in attrs {
            write!(self.writer, " {key}=\"{value}\"")?;
        }
        writeln!(self.writer, ">")?;
        self.indent += 1;
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> std::io::Result<()> {
        self.indent -= 1;
        self.write_indent()?;
        writeln!(self.writer, "</{name}>")
    }

    /// Write a `DataArray` of already-formatted values, six per line
    fn data_array<I>(
        &mut self,
        vtk_type: &str,
        name: &str,
        components: usize,
        values: I,
    ) -> std::io::Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let mut attrs = vec![("type", vtk_type.to_string()), ("Name", name.to_string())];
        if components > 1 {
            attrs.push(("NumberOfComponents", components.to_string()));
        }
        attrs.push(("format", "ascii".to_string()));
        self.start_element("DataArray", &attrs)?;

        self.write_indent()?;
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                // Line break every 6 values for readability
                if i % 6 == 0 {
                    writeln!(self.writer)?;
                    self.write_indent()?;
                } else {
                    write!(self.writer, " ")?;
                }
            }
            write!(self.writer, "{v}")?;
        }
        writeln!(self.writer)?;

        self.end_element("DataArray")
    }

    fn finish(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn f64_values(values: impl IntoIterator<Item = f64>) -> impl Iterator<Item = String> {
    values.into_iter().map(|v| format!("{v:.10e}"))
}

/// Write one VTU document describing `fields` on `mesh` at `time`
///
/// # Errors
///
/// Returns [`OutputError::FieldLength`] if a field does not match the mesh, or
/// [`OutputError::Io`] on write failure.
pub fn write_vtu<W: Write>(
    writer: W,
    mesh: &BoxMesh,
    time: f64,
    fields: &[NamedField<'_>],
) -> Result<(), OutputError> {
    let n_points = mesh.node_count();
    for field in fields {
        if field.values.len() != n_points {
            return Err(OutputError::FieldLength {
                name: field.name.to_string(),
                expected: n_points,
                found: field.values.len(),
            });
        }
    }

    let mut w = VtkWriter::new(writer);
    w.line("<?xml version=\"1.0\"?>")?;
    w.start_element(
        "VTKFile",
        &[
            ("type", "UnstructuredGrid".to_string()),
            ("version", "0.1".to_string()),
            ("byte_order", "LittleEndian".to_string()),
        ],
    )?;
    w.start_element("UnstructuredGrid", &[])?;

    w.start_element("FieldData", &[])?;
    w.data_array("Float64", "TimeValue", 1, f64_values([time]))?;
    w.end_element("FieldData")?;

    w.start_element(
        "Piece",
        &[
            ("NumberOfPoints", n_points.to_string()),
            ("NumberOfCells", mesh.cell_count().to_string()),
        ],
    )?;

    w.start_element("Points", &[])?;
    let points = (0..n_points).flat_map(|node| {
        let (x, y) = mesh.coordinates(node);
        [x, y, 0.0]
    });
    w.data_array("Float64", "Points", 3, f64_values(points))?;
    w.end_element("Points")?;

    w.start_element("Cells", &[])?;
    let connectivity = mesh.cells().flatten().map(|n| n.to_string());
    w.data_array("Int64", "connectivity", 1, connectivity)?;
    let offsets = (1..=mesh.cell_count()).map(|c| (4 * c).to_string());
    w.data_array("Int64", "offsets", 1, offsets)?;
    let types = std::iter::repeat_n(VTK_QUAD.to_string(), mesh.cell_count());
    w.data_array("UInt8", "types", 1, types)?;
    w.end_element("Cells")?;

    w.start_element("PointData", &[])?;
    for field in fields {
        match field.values {
            FieldValues::Scalar(values) => {
                w.data_array("Float64", field.name, 1, f64_values(values.iter().copied()))?;
            }
            FieldValues::Vector(values) => {
                let padded = values.iter().flat_map(|u| [u.x, u.y, 0.0]);
                w.data_array("Float64", field.name, 3, f64_values(padded))?;
            }
        }
    }
    w.end_element("PointData")?;

    w.end_element("Piece")?;
    w.end_element("UnstructuredGrid")?;
    w.end_element("VTKFile")?;
    w.finish()?;
    Ok(())
}

/// Frame-numbered VTU series with a PVD collection
///
/// For a base path `out/output.pvd`, frames land in `out/output_0000.vtu`,
/// `out/output_0001.vtu`, ... and `out/output.pvd` is rewritten after every frame.
#[derive(Debug, Clone)]
pub struct VtkSeries {
    directory: PathBuf,
    stem: String,
    /// Frame index → (time, file name)
    frames: BTreeMap<usize, (f64, String)>,
}

impl VtkSeries {
    /// Create a series rooted at `base_path` (extension ignored)
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        let base = base_path.as_ref();
        let stem = base
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        let directory = base
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            directory,
            stem,
            frames: BTreeMap::new(),
        }
    }

    /// Path of the VTU file for a frame
    pub fn frame_path(&self, frame: usize) -> PathBuf {
        self.directory.join(self.frame_file_name(frame))
    }

    /// Path of the PVD collection
    pub fn collection_path(&self) -> PathBuf {
        self.directory.join(format!("{}.pvd", self.stem))
    }

    fn frame_file_name(&self, frame: usize) -> String {
        format!("{}_{:04}.vtu", self.stem, frame)
    }

    fn write_collection(&self) -> Result<(), OutputError> {
        let mut w = VtkWriter::new(File::create(self.collection_path())?);
        w.line("<?xml version=\"1.0\"?>")?;
        w.start_element("VTKFile", &[("type", "Collection".to_string()), ("version", "0.1".to_string())])?;
        w.start_element("Collection", &[])?;
        for (time, file) in self.frames.values() {
            w.line(&format!(
                "<DataSet timestep=\"{time:.10e}\" part=\"0\" file=\"{file}\"/>"
            ))?;
        }
        w.end_element("Collection")?;
        w.end_element("VTKFile")?;
        w.finish()?;
        Ok(())
    }
}

impl VisualizationSink for VtkSeries {
    fn write(
        &mut self,
        frame: usize,
        time: f64,
        mesh: &BoxMesh,
        fields: &[NamedField<'_>],
    ) -> Result<(), OutputError> {
        let path = self.frame_path(frame);
        write_vtu(File::create(&path)?, mesh, time, fields)?;
        self.frames
            .insert(frame, (time, self.frame_file_name(frame)));
        self.write_collection()?;
        debug!("Wrote VTK frame {} to {}", frame, path.display());
        Ok(())
    }
}
