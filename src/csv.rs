use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::{Bodies, BuildDiagnostics, DiagnosticRecord, Octree};

pub fn write_bodies_to(mut out: impl Write, bodies: &Bodies) -> Result<(), io::Error> {
    writeln!(out, "i,mass,x,y,z,vx,vy,vz")?;

    for (i, ((m, p), v)) in bodies
        .masses()
        .iter()
        .zip(bodies.positions())
        .zip(bodies.velocities())
        .enumerate()
    {
        writeln!(
            out,
            "{i},{m},{},{},{},{},{},{}",
            p.x, p.y, p.z, v.x, v.y, v.z
        )?;
    }

    Ok(())
}

/// Write mass, position and velocity of every body, one body per row.
pub fn write_bodies(bodies: &Bodies, path: impl AsRef<Path>) -> Result<(), io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    write_bodies_to(&mut file, bodies)?;
    file.flush()
}

pub fn write_diagnostics_to(
    mut out: impl Write,
    records: &[DiagnosticRecord],
) -> Result<(), io::Error> {
    writeln!(out, "{}", DiagnosticRecord::CSV_HEADER)?;
    for record in records {
        writeln!(out, "{record}")?;
    }
    Ok(())
}

/// Write the diagnostic log, one step per row.
pub fn write_diagnostics(
    records: &[DiagnosticRecord],
    path: impl AsRef<Path>,
) -> Result<(), io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    write_diagnostics_to(&mut file, records)?;
    file.flush()
}

/// Write the node buffers of `octree`, one node per row.
///
/// Child slots are written as raw slot values: bodies are `0..n`, node `k`
/// is `n + k` and empty slots are `4294967295`. Overflow bodies of a node are
/// separated by spaces.
pub fn write_octree_to(mut out: impl Write, octree: &Octree) -> Result<(), io::Error> {
    writeln!(
        out,
        "node,c0,c1,c2,c3,c4,c5,c6,c7,mass,com_x,com_y,com_z,bodies,overflow"
    )?;

    for node in 0..octree.node_count() as u32 {
        write!(out, "{node}")?;
        for slot in octree.child_slots(node) {
            write!(out, ",{slot}")?;
        }
        let com = octree.center_of_mass(node);
        write!(
            out,
            ",{},{},{},{},{},",
            octree.mass(node),
            com.x,
            com.y,
            com.z,
            octree.body_count(node)
        )?;
        let overflow: Vec<_> = octree.overflow_bodies(node).map(|b| b.to_string()).collect();
        writeln!(out, "{}", overflow.join(" "))?;
    }

    Ok(())
}

pub fn write_octree(octree: &Octree, path: impl AsRef<Path>) -> Result<(), io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    write_octree_to(&mut file, octree)?;
    file.flush()
}

/// Write the bodies that raised a build flag, together with the flags of the build.
pub fn write_failed_bodies_to(
    mut out: impl Write,
    diagnostics: &BuildDiagnostics,
) -> Result<(), io::Error> {
    writeln!(out, "body,flags")?;
    for body in &diagnostics.failed_bodies {
        writeln!(out, "{body},{}", diagnostics.flags.bits())?;
    }
    Ok(())
}

pub fn write_failed_bodies(
    diagnostics: &BuildDiagnostics,
    path: impl AsRef<Path>,
) -> Result<(), io::Error> {
    let mut file = BufWriter::new(File::create(path)?);
    write_failed_bodies_to(&mut file, diagnostics)?;
    file.flush()
}
