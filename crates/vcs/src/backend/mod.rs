pub mod git;
pub mod svn;
