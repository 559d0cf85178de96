pub(crate) mod marking;
pub(crate) mod marking_editor;
pub(crate) mod preview;
