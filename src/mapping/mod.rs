//! # Field mapping
//!
//! Turns the merged source table into the destination particle table:
//! renames fields into the destination vocabulary, converts fractional
//! coordinates to absolute pixels (optionally swapping the axis roles,
//! since the two pipelines usually disagree on the pixel coordinate
//! convention), fans the axis-angle pose out into the three Euler angle
//! columns, converts radians to degrees, and shifts 0-based source
//! indices to the 1-based destination numbering.
//!
//! Class filtering runs *after* mapping, so an allow-set is matched
//! against destination (1-based) class numbers.

use std::collections::BTreeSet;

use log::info;

use crate::merge::MergedTable;
use crate::star::{columns, StarTable, StarValue};

pub mod geometry;

#[cfg(test)]
mod tests;

/// Source field names of the upstream pipeline.
pub mod fields {
    /// Micrograph the particle was picked from, project-relative
    pub const MICROGRAPH_PATH: &str = "location/micrograph_path";
    /// Normalized X position of the particle center
    pub const CENTER_X_FRAC: &str = "location/center_x_frac";
    /// Normalized Y position of the particle center
    pub const CENTER_Y_FRAC: &str = "location/center_y_frac";
    /// Micrograph dimensions as a (height, width) pair
    pub const MICROGRAPH_SHAPE: &str = "location/micrograph_shape";
    /// Pixel size in Angstrom
    pub const PIXEL_SIZE: &str = "blob/psize_A";
    /// Particle stack file
    pub const BLOB_PATH: &str = "blob/path";
    /// 0-based index within the particle stack
    pub const BLOB_IDX: &str = "blob/idx";
    /// Axis-angle orientation from 3D alignment
    pub const POSE_3D: &str = "alignments3D/pose";
    /// Scalar in-plane angle (radians) from 2D alignment
    pub const POSE_2D: &str = "alignments2D/pose";
    /// 0-based class assignment from 3D classification
    pub const CLASS_3D: &str = "alignments3D/class";
    /// 0-based class assignment from 2D classification
    pub const CLASS_2D: &str = "alignments2D/class";
    /// Defocus along the major axis (Angstrom)
    pub const DF1: &str = "ctf/df1_A";
    /// Defocus along the minor axis (Angstrom)
    pub const DF2: &str = "ctf/df2_A";
    /// Astigmatism angle (radians)
    pub const DF_ANGLE: &str = "ctf/df_angle_rad";
    /// Acceleration voltage (kV)
    pub const VOLTAGE: &str = "ctf/accel_kv";
    /// Spherical aberration (mm)
    pub const CS: &str = "ctf/cs_mm";
    /// Amplitude contrast fraction
    pub const AMP_CONTRAST: &str = "ctf/amp_contrast";
    /// Phase plate shift (radians)
    pub const PHASE_SHIFT: &str = "ctf/phase_shift_rad";
    /// 0-based exposure group
    pub const EXP_GROUP: &str = "ctf/exp_group_id";
}

/// Errors that can occur while mapping the merged table
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// No file in the chain supplied a field the destination needs
    #[error("destination field {dest} cannot be produced: no file in the chain supplies {src_field}")]
    MissingRequiredField {
        /// Source field that was never supplied
        src_field: String,
        /// Destination field it feeds
        dest: String,
    },

    /// A field exists in the schema but has no value for some record
    #[error("field {field} has no value for particle {uid}")]
    MissingFieldValue {
        /// Source field name
        field: String,
        /// Record identifier
        uid: u64,
    },

    /// A field's value has a type the mapping cannot use
    #[error("field {field} has an unexpected type for particle {uid}")]
    UnexpectedType {
        /// Source field name
        field: String,
        /// Record identifier
        uid: u64,
    },

    /// Class filtering was requested but no class field was mapped
    #[error("class selection requested but no class assignments are present")]
    NoClassAssignments,

    /// Destination table construction failed
    #[error(transparent)]
    Table(#[from] crate::star::StarError),
}

/// Fields the destination schema cannot do without, with the
/// destination column each feeds
const REQUIRED: [(&str, &str); 5] = [
    (fields::MICROGRAPH_PATH, columns::MICROGRAPH_NAME),
    (fields::CENTER_X_FRAC, columns::COORDINATE_X),
    (fields::CENTER_Y_FRAC, columns::COORDINATE_Y),
    (fields::MICROGRAPH_SHAPE, columns::COORDINATE_X),
    (fields::PIXEL_SIZE, columns::IMAGE_PIXEL_SIZE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pose {
    None,
    InPlane,
    Full,
}

/// Which optional destination columns the merged table can feed
#[derive(Debug)]
struct Plan {
    has_image: bool,
    pose: Pose,
    has_defocus: bool,
    has_df_angle: bool,
    has_phase_shift: bool,
    has_voltage: bool,
    has_cs: bool,
    has_amp_contrast: bool,
    has_exp_group: bool,
    class_field: Option<&'static str>,
}

impl Plan {
    fn from_table(merged: &MergedTable) -> Self {
        let pose = if merged.has_field(fields::POSE_3D) {
            Pose::Full
        } else if merged.has_field(fields::POSE_2D) {
            Pose::InPlane
        } else {
            Pose::None
        };
        let class_field = if merged.has_field(fields::CLASS_3D) {
            Some(fields::CLASS_3D)
        } else if merged.has_field(fields::CLASS_2D) {
            Some(fields::CLASS_2D)
        } else {
            None
        };
        Self {
            has_image: merged.has_field(fields::BLOB_PATH) && merged.has_field(fields::BLOB_IDX),
            pose,
            has_defocus: merged.has_field(fields::DF1) && merged.has_field(fields::DF2),
            has_df_angle: merged.has_field(fields::DF_ANGLE),
            has_phase_shift: merged.has_field(fields::PHASE_SHIFT),
            has_voltage: merged.has_field(fields::VOLTAGE),
            has_cs: merged.has_field(fields::CS),
            has_amp_contrast: merged.has_field(fields::AMP_CONTRAST),
            has_exp_group: merged.has_field(fields::EXP_GROUP),
            class_field,
        }
    }

    fn columns(&self) -> Vec<String> {
        let mut cols = vec![
            columns::MICROGRAPH_NAME.to_string(),
            columns::COORDINATE_X.to_string(),
            columns::COORDINATE_Y.to_string(),
        ];
        if self.has_image {
            cols.push(columns::IMAGE_NAME.to_string());
        }
        if self.pose == Pose::Full {
            cols.push(columns::ANGLE_ROT.to_string());
            cols.push(columns::ANGLE_TILT.to_string());
        }
        if self.pose != Pose::None {
            cols.push(columns::ANGLE_PSI.to_string());
        }
        if self.has_defocus {
            cols.push(columns::DEFOCUS_U.to_string());
            cols.push(columns::DEFOCUS_V.to_string());
        }
        if self.has_df_angle {
            cols.push(columns::DEFOCUS_ANGLE.to_string());
        }
        if self.has_phase_shift {
            cols.push(columns::PHASE_SHIFT.to_string());
        }
        if self.has_voltage {
            cols.push(columns::VOLTAGE.to_string());
        }
        if self.has_cs {
            cols.push(columns::SPHERICAL_ABERRATION.to_string());
        }
        if self.has_amp_contrast {
            cols.push(columns::AMPLITUDE_CONTRAST.to_string());
        }
        cols.push(columns::IMAGE_PIXEL_SIZE.to_string());
        cols.push(columns::OPTICS_GROUP.to_string());
        if self.class_field.is_some() {
            cols.push(columns::CLASS_NUMBER.to_string());
        }
        cols
    }
}

/// One merged row plus the context needed for error reporting
struct RowView<'a> {
    merged: &'a MergedTable,
    row: usize,
    uid: u64,
}

impl RowView<'_> {
    fn f64(&self, field: &str) -> Result<f64, MapError> {
        let value = self
            .merged
            .value(self.row, field)
            .ok_or_else(|| MapError::MissingFieldValue {
                field: field.to_string(),
                uid: self.uid,
            })?;
        value.as_f64().ok_or_else(|| MapError::UnexpectedType {
            field: field.to_string(),
            uid: self.uid,
        })
    }

    fn i64(&self, field: &str) -> Result<i64, MapError> {
        let value = self
            .merged
            .value(self.row, field)
            .ok_or_else(|| MapError::MissingFieldValue {
                field: field.to_string(),
                uid: self.uid,
            })?;
        value.as_i64().ok_or_else(|| MapError::UnexpectedType {
            field: field.to_string(),
            uid: self.uid,
        })
    }

    fn str(&self, field: &str) -> Result<&str, MapError> {
        let value = self
            .merged
            .value(self.row, field)
            .ok_or_else(|| MapError::MissingFieldValue {
                field: field.to_string(),
                uid: self.uid,
            })?;
        value.as_str().ok_or_else(|| MapError::UnexpectedType {
            field: field.to_string(),
            uid: self.uid,
        })
    }

    fn f64_vec(&self, field: &str, len: usize) -> Result<Vec<f64>, MapError> {
        let value = self
            .merged
            .value(self.row, field)
            .ok_or_else(|| MapError::MissingFieldValue {
                field: field.to_string(),
                uid: self.uid,
            })?;
        let items = value.as_f64_vec().ok_or_else(|| MapError::UnexpectedType {
            field: field.to_string(),
            uid: self.uid,
        })?;
        if items.len() < len {
            return Err(MapError::UnexpectedType {
                field: field.to_string(),
                uid: self.uid,
            });
        }
        Ok(items)
    }
}

/// Convert a normalized position into absolute pixel coordinates.
/// `shape` is (height, width); with `swap_xy`, the two fractions trade
/// which dimension scales them.
pub fn absolute_coords(
    x_frac: f64,
    y_frac: f64,
    shape: (f64, f64),
    swap_xy: bool,
) -> (f64, f64) {
    let (height, width) = shape;
    if swap_xy {
        ((y_frac * height).round(), (x_frac * width).round())
    } else {
        ((x_frac * width).round(), (y_frac * height).round())
    }
}

/// Reflect an in-plane angle across the swapped axes. Applying this
/// twice returns the original angle.
pub fn swap_in_plane_angle(psi_deg: f64) -> f64 {
    90.0 - psi_deg
}

/// In-stack image reference: 1-based index, zero-padded, `@`, stack path
pub fn stack_image_name(idx: i64, stack: &str) -> String {
    format!("{:06}@{}", idx + 1, stack)
}

/// Map the merged table into the destination particle table
pub fn map_particles(merged: &MergedTable, swap_xy: bool) -> Result<StarTable, MapError> {
    for (source, dest) in REQUIRED {
        if !merged.has_field(source) {
            return Err(MapError::MissingRequiredField {
                src_field: source.to_string(),
                dest: dest.to_string(),
            });
        }
    }

    let plan = Plan::from_table(merged);
    let mut table = StarTable::new("particles", plan.columns());

    for row in 0..merged.len() {
        let view = RowView {
            merged,
            row,
            uid: merged.uids()[row],
        };
        let mut values = Vec::with_capacity(table.columns().len());

        values.push(StarValue::Str(
            view.str(fields::MICROGRAPH_PATH)?.to_string(),
        ));

        let shape = view.f64_vec(fields::MICROGRAPH_SHAPE, 2)?;
        let (x, y) = absolute_coords(
            view.f64(fields::CENTER_X_FRAC)?,
            view.f64(fields::CENTER_Y_FRAC)?,
            (shape[0], shape[1]),
            swap_xy,
        );
        values.push(StarValue::Float(x));
        values.push(StarValue::Float(y));

        if plan.has_image {
            let idx = view.i64(fields::BLOB_IDX)?;
            let stack = view.str(fields::BLOB_PATH)?;
            values.push(StarValue::Str(stack_image_name(idx, stack)));
        }

        match plan.pose {
            Pose::Full => {
                let pose = view.f64_vec(fields::POSE_3D, 3)?;
                let (rot, tilt, mut psi) = geometry::pose_to_euler_deg([pose[0], pose[1], pose[2]]);
                if swap_xy {
                    psi = swap_in_plane_angle(psi);
                }
                values.push(StarValue::Float(rot));
                values.push(StarValue::Float(tilt));
                values.push(StarValue::Float(psi));
            }
            Pose::InPlane => {
                let mut psi = view.f64(fields::POSE_2D)?.to_degrees();
                if swap_xy {
                    psi = swap_in_plane_angle(psi);
                }
                values.push(StarValue::Float(psi));
            }
            Pose::None => {}
        }

        if plan.has_defocus {
            values.push(StarValue::Float(view.f64(fields::DF1)?));
            values.push(StarValue::Float(view.f64(fields::DF2)?));
        }
        if plan.has_df_angle {
            values.push(StarValue::Float(view.f64(fields::DF_ANGLE)?.to_degrees()));
        }
        if plan.has_phase_shift {
            values.push(StarValue::Float(
                view.f64(fields::PHASE_SHIFT)?.to_degrees(),
            ));
        }
        if plan.has_voltage {
            values.push(StarValue::Float(view.f64(fields::VOLTAGE)?));
        }
        if plan.has_cs {
            values.push(StarValue::Float(view.f64(fields::CS)?));
        }
        if plan.has_amp_contrast {
            values.push(StarValue::Float(view.f64(fields::AMP_CONTRAST)?));
        }

        values.push(StarValue::Float(view.f64(fields::PIXEL_SIZE)?));

        let group = if plan.has_exp_group {
            view.i64(fields::EXP_GROUP)? + 1
        } else {
            1
        };
        values.push(StarValue::Int(group));

        if let Some(class_field) = plan.class_field {
            values.push(StarValue::Int(view.i64(class_field)? + 1));
        }

        table.push_row(values)?;
    }

    info!(
        "mapped {} particles into {} destination fields",
        table.len(),
        table.columns().len()
    );
    Ok(table)
}

/// Drop every particle whose (1-based, destination-space) class number
/// is not in the allow-set. Returns how many rows were dropped.
pub fn select_classes(
    table: &mut StarTable,
    allowed: &BTreeSet<i64>,
) -> Result<usize, MapError> {
    let col = table
        .column_index(columns::CLASS_NUMBER)
        .ok_or(MapError::NoClassAssignments)?;
    let dropped = table.retain_rows(|row| {
        row.get(col)
            .and_then(StarValue::as_i64)
            .is_some_and(|class| allowed.contains(&class))
    });
    if dropped > 0 {
        info!("class selection dropped {} particle(s)", dropped);
    }
    Ok(dropped)
}
