/// Destination column names as constants for type safety
/// Micrograph the particle was picked from
pub const MICROGRAPH_NAME: &str = "rlnMicrographName";
/// Particle X coordinate in the micrograph (pixels)
pub const COORDINATE_X: &str = "rlnCoordinateX";
/// Particle Y coordinate in the micrograph (pixels)
pub const COORDINATE_Y: &str = "rlnCoordinateY";
/// Particle image as `NNNNNN@stack` with a 1-based in-stack index
pub const IMAGE_NAME: &str = "rlnImageName";
/// First Euler angle (rot, degrees)
pub const ANGLE_ROT: &str = "rlnAngleRot";
/// Second Euler angle (tilt, degrees)
pub const ANGLE_TILT: &str = "rlnAngleTilt";
/// Third Euler angle (psi, in-plane, degrees)
pub const ANGLE_PSI: &str = "rlnAnglePsi";
/// Defocus along the major axis (Angstrom)
pub const DEFOCUS_U: &str = "rlnDefocusU";
/// Defocus along the minor axis (Angstrom)
pub const DEFOCUS_V: &str = "rlnDefocusV";
/// Astigmatism angle (degrees)
pub const DEFOCUS_ANGLE: &str = "rlnDefocusAngle";
/// Phase shift from a phase plate (degrees)
pub const PHASE_SHIFT: &str = "rlnPhaseShift";
/// Acceleration voltage (kV)
pub const VOLTAGE: &str = "rlnVoltage";
/// Spherical aberration (mm)
pub const SPHERICAL_ABERRATION: &str = "rlnSphericalAberration";
/// Amplitude contrast fraction
pub const AMPLITUDE_CONTRAST: &str = "rlnAmplitudeContrast";
/// Pixel size of the particle image (Angstrom)
pub const IMAGE_PIXEL_SIZE: &str = "rlnImagePixelSize";
/// Optics group number (1-based)
pub const OPTICS_GROUP: &str = "rlnOpticsGroup";
/// Class assignment (1-based)
pub const CLASS_NUMBER: &str = "rlnClassNumber";
