// Small in-memory DICOM objects shared by the unit tests.

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;

pub const SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";
pub const SOP_INSTANCE: &str = "1.2.826.0.1.3680043.2.1125.1";

/// Secondary Capture instance with the identifying and audit attributes filled in.
pub fn sample_tree(patient_id: &str) -> DefaultDicomObject {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(SOP_CLASS)
        .media_storage_sop_instance_uid(SOP_INSTANCE)
        .build()
        .expect("meta");

    let mut obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    let elements = [
        (Tag(0x0008, 0x0016), VR::UI, SOP_CLASS),
        (Tag(0x0008, 0x0018), VR::UI, SOP_INSTANCE),
        (Tag(0x0008, 0x0021), VR::DA, "20240102"),
        (Tag(0x0008, 0x0031), VR::TM, "101500"),
        (Tag(0x0008, 0x0060), VR::CS, "OT"),
        (Tag(0x0010, 0x0010), VR::PN, "Doe^Jane"),
        (Tag(0x0010, 0x0020), VR::LO, patient_id),
        (Tag(0x0010, 0x0030), VR::DA, "19700101"),
        (Tag(0x0020, 0x0013), VR::IS, "7"),
    ];
    for (tag, vr, value) in elements {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }
    obj.put(DataElement::new(
        Tag(0x0028, 0x0010),
        VR::US,
        PrimitiveValue::from(2_u16),
    )); // Rows
    obj
}
