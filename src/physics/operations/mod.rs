pub mod point_defect;
pub mod supercell;
