//! Manual alias tables for free-text normalization.
//!
//! These cover the phrasings LLMs actually emit that the catalogue's
//! synonym lists miss: descriptive sort phrases, snake_case or collapsed
//! predicate spellings, and a handful of recurring typos.

/// Free-text sort phrases mapped to canonical sort names.
pub const MANUAL_SORT_ALIASES: &[(&str, &str)] = &[
    ("soggetto obbligato all'adempimento", "Debitore"),
    ("soggetto debitore", "Debitore"),
    ("soggetto titolare della pretesa", "Creditore"),
    ("soggetto creditore", "Creditore"),
    ("accordo che genera obbligazioni", "Contratto"),
    ("accordo tra parti che genera obbligazioni", "Contratto"),
    ("accordo tra parti che genera obbligazioni contrattuali", "Contratto"),
    ("accordo tra parti", "Contratto"),
    ("soggetto giuridico coinvolto nel rapporto obbligatorio", "Soggetto"),
    ("pregiudizio economico o non economico", "Danno"),
    ("pregiudizio economico", "Danno"),
    ("pregiudizio non economico", "Danno"),
    ("bene registrato", "BeneRegistrato"),
    ("marchio registrato", "Marchio"),
    ("misura cautelare personale", "MisuraCautelare"),
    ("misura cautelare reale", "MisuraCautelare"),
    ("sanzione penale", "Pena"),
    ("sanzione amministrativa", "Pena"),
    ("struttura sanitaria", "StrutturaSanitaria"),
    ("procedura esecutiva", "Procedura"),
    ("testamento olografo", "Testamento"),
    ("sort", "Entity"),
];

/// Collapsed/misspelled predicate names mapped to canonical predicates.
pub const MANUAL_PREDICATE_ALIASES: &[(&str, &str)] = &[
    ("responsabilitacontrattuale", "ResponsabilitaContrattuale"),
    ("responsabilita_contrattuale", "ResponsabilitaContrattuale"),
    ("inadempimento", "Inadempimento"),
    ("mora del debitore", "Mora"),
    ("dannopatrimoniale", "DannoPatrimoniale"),
    ("ogggettononillecito", "OggettoDeterminato"),
    ("oggettononillecito", "OggettoDeterminato"),
    ("ognettodeterminato", "OggettoDeterminato"),
    ("causanonillecita", "CausaLegittima"),
    ("possessopacifico", "PossessoPubblico"),
    ("animusdomini", "AnimusDomini"),
    ("duratapossesso20anni", "DurataPossesso"),
    ("duratapossessoventianni", "DurataPossesso"),
    ("duratapossessoalmeno20anni", "DurataPossesso"),
    ("duratapossessoalmeno2anni", "DurataPossesso"),
    ("duratapossessominore2anni", "DurataPossesso"),
    ("duratapossessominoredueanni", "DurataPossesso"),
    ("perditabene", "PerditaBene"),
    ("avariabene", "AvariaBene"),
    ("perditavaria", "PerditaAvaria"),
    ("rivendicazioneproprietario", "RivendicazioneProprietario"),
    ("rivendicazione", "RivendicazioneProprietario"),
    ("iscrizioneregistro", "IscrizioneRegistro"),
    ("contrattotrasporto", "ContrattoTrasporto"),
    ("eventoinadempimento", "EventoInadempimento"),
    ("causanonimputabile", "CausaNonImputabile"),
    ("nonrivendicato", "NonRivendicato"),
    ("nessuna rivendicazione", "NonRivendicato"),
    ("nessuna_rivendicazione", "NonRivendicato"),
    ("nessunarivendicazione", "NonRivendicato"),
];
